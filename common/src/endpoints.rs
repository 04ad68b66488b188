pub const PATH_SENSORS_DATA: &str = "/sensors_data";
pub const PATH_SETTINGS: &str = "/settings";
pub const PATH_GRAPH: &str = "/graph";

pub fn sensors_data_url(endpoint: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), PATH_SENSORS_DATA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_double_slash() {
        assert_eq!(
            sensors_data_url("http://hub.local:8000/"),
            "http://hub.local:8000/sensors_data"
        );
        assert_eq!(
            sensors_data_url("https://hub.example.com"),
            "https://hub.example.com/sensors_data"
        );
    }
}
