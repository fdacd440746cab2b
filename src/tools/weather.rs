use async_trait::async_trait;

use crate::error::Result;
use crate::tool::Tool;

pub const GET_WEATHER_INFO: &str = "getWeatherInfo";

/// Canned weather lookup. Always reports the same temperature.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        GET_WEATHER_INFO
    }

    fn description(&self) -> &str {
        "getWeatherInfo(city: string): Returns a short weather report for the city."
    }

    async fn call(&self, input: &str) -> Result<String> {
        Ok(format!("{input} has 42 degrees C"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_for_the_requested_city() {
        assert_eq!(
            WeatherTool.call("Patiala").await.unwrap(),
            "Patiala has 42 degrees C"
        );
    }

    #[tokio::test]
    async fn passes_the_input_through_verbatim() {
        assert_eq!(
            WeatherTool.call(" Patiala ").await.unwrap(),
            " Patiala  has 42 degrees C"
        );
    }
}
