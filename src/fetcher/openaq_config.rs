//! OpenAQ v3 endpoint configuration
//!
//! Paths are relative to the configured base URL (e.g. <https://api.openaq.org/v3>).

/// Endpoint paths and header names of the OpenAQ v3 API
#[derive(Debug, Clone)]
pub struct OpenAqEndpoints {
    /// Location search (`bbox`, `limit`, `page`)
    pub locations_endpoint: &'static str,

    /// Sensors of one location, `{id}` is the location id
    pub location_sensors_endpoint: &'static str,

    /// Measurements of one sensor, `{id}` is the sensor id
    pub sensor_measurements_endpoint: &'static str,

    /// Header carrying the API key
    pub api_key_header: &'static str,

    /// Remaining requests in the current provider window
    pub rate_limit_remaining_header: &'static str,

    /// Seconds until the provider window resets
    pub rate_limit_reset_header: &'static str,
}

/// OpenAQ v3 configuration
pub const OPENAQ_V3: OpenAqEndpoints = OpenAqEndpoints {
    locations_endpoint: "/locations",
    location_sensors_endpoint: "/locations/{id}/sensors",
    sensor_measurements_endpoint: "/sensors/{id}/measurements",
    api_key_header: "X-API-Key",
    rate_limit_remaining_header: "x-ratelimit-remaining",
    rate_limit_reset_header: "x-ratelimit-reset",
};

impl OpenAqEndpoints {
    /// Sensors path for `location_id`
    pub fn location_sensors(&self, location_id: i64) -> String {
        self.location_sensors_endpoint
            .replace("{id}", &location_id.to_string())
    }

    /// Measurements path for `sensor_id`
    pub fn sensor_measurements(&self, sensor_id: i64) -> String {
        self.sensor_measurements_endpoint
            .replace("{id}", &sensor_id.to_string())
    }
}
