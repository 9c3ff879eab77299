//! Weather lookup tool: returns deterministic mock weather data.
//!
//! The data is derived from the location name so ReAct runs can be
//! exercised end-to-end without network access.

use agentloom_core::error::ToolError;
use agentloom_core::tool::{Tool, ToolContext};
use async_trait::async_trait;

use crate::{field_or_text, parse_input};

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    fn description(&self) -> &str {
        "Look up current weather for a location. Input: a city name, or {\"location\": ..., \"units\": \"metric\"|\"imperial\"}."
    }

    fn parameters_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city name or location to look up weather for"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "default": "metric"
                }
            },
            "required": ["location"]
        }))
    }

    async fn execute(&self, _ctx: &ToolContext, input: &str) -> Result<String, ToolError> {
        let args = parse_input(input);
        let location = field_or_text(&args, "location")
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ToolError::InvalidInput("missing location".into()))?;
        let units = args["units"].as_str().unwrap_or("metric");

        let weather = generate_mock_weather(&location, units);
        serde_json::to_string(&weather).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })
    }
}

#[derive(serde::Serialize)]
struct WeatherData {
    location: String,
    temperature: f64,
    units: String,
    conditions: String,
    humidity: u32,
    wind_speed: f64,
}

fn generate_mock_weather(location: &str, units: &str) -> WeatherData {
    let hash: u32 = location
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = [
        "Clear skies",
        "Partly cloudy",
        "Overcast",
        "Light rain",
        "Thunderstorms",
        "Snow",
        "Foggy",
    ];

    let base_temp_c = ((hash % 40) as f64) - 5.0;
    let (temperature, unit_label) = if units == "imperial" {
        (base_temp_c * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (base_temp_c, "°C")
    };

    WeatherData {
        location: location.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units: unit_label.to_string(),
        conditions: conditions[(hash as usize / 7) % conditions.len()].to_string(),
        humidity: 30 + (hash % 60),
        wind_speed: ((hash % 30) as f64) + 5.0,
    }
}
