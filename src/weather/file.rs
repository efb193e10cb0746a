/// Weather soundings stored as a YAML or JSON list of `WeatherData`.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq)]
pub struct WeatherFile {
    pub path: std::path::PathBuf,
}

impl WeatherFile {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }

    fn is_json(&self) -> bool {
        matches!(
            self.path.extension().and_then(|extension| extension.to_str()),
            Some("json") | Some("geojson")
        )
    }

    pub fn read_weather_from_file(
        &self,
    ) -> Result<Vec<crate::weather::WeatherData>, crate::weather::WeatherError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(error) => {
                return Err(crate::weather::WeatherError::ServiceUnavailable {
                    message: format!("{:}: {:}", self.path.display(), error),
                })
            }
        };
        let reader = std::io::BufReader::new(file);

        let parsed = if self.is_json() {
            serde_json::from_reader(reader).map_err(|error| error.to_string())
        } else {
            serde_yaml::from_reader(reader).map_err(|error| error.to_string())
        };

        match parsed {
            Ok(data) => Ok(data),
            Err(message) => Err(crate::weather::WeatherError::Parsing {
                message: format!("{:}: {:}", self.path.display(), message),
            }),
        }
    }
}

impl crate::weather::WeatherProvider for WeatherFile {
    fn name(&self) -> &str {
        "file"
    }

    fn select_weather_data(
        &self,
        query: &crate::weather::WeatherQuery,
    ) -> Result<Vec<crate::weather::WeatherData>, crate::weather::WeatherError> {
        let data = crate::weather::within_window(&self.read_weather_from_file()?, query);
        log::debug!(
            "read {:} soundings from {:} within {:} minutes of launch",
            data.len(),
            self.path.display(),
            query.window_minutes
        );

        if data.is_empty() {
            return Err(crate::weather::WeatherError::NoData);
        }
        Ok(data)
    }
}
