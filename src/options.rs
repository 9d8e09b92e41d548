use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::Help;
use eyre::Context;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

/// Global options for the application.
#[derive(Debug, Serialize, Deserialize)]
pub struct Options {
    /// Directory where application data is stored (including logs).
    ///
    /// Default is `data`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory where secrets are loaded from.
    ///
    /// Default is `secrets`.
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,
    /// Base url of the chart listing api.
    ///
    /// Default is `http://localhost:8080`.
    /// Can be specified by setting the environment variable `API_URL`.
    #[serde(default = "default_api_url")]
    pub api_url: url::Url,
    /// Number of rows per page when the table is first shown.
    ///
    /// Default is `100`.
    /// Can be specified by setting the environment variable `COUNT`.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Page sizes the user can choose from.
    ///
    /// Default is `[10, 50, 100, 500, 1000]`.
    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<u32>,
    /// Total number of rows reported to the pagination control. The listing api doesn't report
    /// a count, so this is a fixed upper bound.
    ///
    /// Default is `10000`.
    #[serde(default = "default_row_count")]
    pub row_count: u64,
    /// Time zone used to display chart update times.
    ///
    /// Default is `Asia/Tokyo`.
    #[serde(default = "default_timezone")]
    pub timezone: chrono_tz::Tz,
    /// Address for the http server to listen on.
    ///
    /// Default is `127.0.0.1:3000`.
    /// Can be specified by setting the environment variable `LISTEN_ADDR`.
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// Timeout for requests to the listing api, e.g. `"30s"`.
    ///
    /// Default is `30s`.
    #[serde(default = "default_request_timeout", with = "humantime_duration")]
    pub request_timeout: Duration,
}

fn default_data_dir() -> PathBuf {
    "data".into()
}

fn default_secrets_dir() -> PathBuf {
    "secrets".into()
}

fn default_api_url() -> url::Url {
    "http://localhost:8080"
        .parse()
        .expect("Unable to parse url")
}

fn default_page_size() -> u32 {
    100
}

fn default_page_size_options() -> Vec<u32> {
    vec![10, 50, 100, 500, 1000]
}

fn default_row_count() -> u64 {
    10000
}

fn default_timezone() -> chrono_tz::Tz {
    chrono_tz::Tz::Asia__Tokyo
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            secrets_dir: default_secrets_dir(),
            api_url: default_api_url(),
            page_size: default_page_size(),
            page_size_options: default_page_size_options(),
            row_count: default_row_count(),
            timezone: default_timezone(),
            listen_address: default_listen_address(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Options {
    /// Initialize the options using the `OPTIONS` environment variable, otherwise load from file
    /// `options.ron` if it exists, otherwise use the defaults. If `OPTIONS` contains a file path,
    /// it will load the options from that path, if `OPTIONS` contains a RON file definition then
    /// it will load the options from the string contained in the variable.
    ///
    /// The environment variables `API_URL`, `COUNT` and `LISTEN_ADDR` override the loaded
    /// options.
    pub async fn initialize() -> eyre::Result<Self> {
        let mut options: Options = match std::env::var("OPTIONS") {
            Ok(options) => match ron::from_str(&options) {
                Ok(options) => {
                    println!("Options loaded from `OPTIONS` environment variable");
                    options
                }
                Err(error) => {
                    let path = PathBuf::from(options);
                    if path.is_file() {
                        let options = Self::read_file(&path).await?;
                        println!("Options loaded from file specified in `OPTIONS` environment variable: {:?}", path);
                        options
                    } else {
                        return Err(error).wrap_err(
                            "Error deserializing options from `OPTIONS` environment variable \
                            string, or you have specified a file path which does not exist",
                        );
                    }
                }
            },
            Err(std::env::VarError::NotPresent) => {
                let path = Path::new("options.ron");
                if path.is_file() {
                    let options = Self::read_file(path).await?;
                    println!("Options loaded from default file: {:?}", path);
                    options
                } else {
                    println!("No `OPTIONS` environment variable or `options.ron`, using defaults");
                    Options::default()
                }
            }
            Err(error) => {
                return Err(error).wrap_err("Error reading `OPTIONS` environment variable")
            }
        };

        options.apply_overrides(|key| std::env::var(key).ok())?;
        options.validate()?;

        let options_str = ron::ser::to_string_pretty(&options, PrettyConfig::default())?;
        println!("Options{}", options_str);

        Ok(options)
    }

    async fn read_file(path: &Path) -> eyre::Result<Self> {
        let options_str = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Error reading options file: {:?}", path))?;
        ron::from_str(&options_str)
            .wrap_err_with(|| format!("Error deserializing options file: {:?}", path))
    }

    /// Apply overrides from environment variables, looked up using `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> eyre::Result<()> {
        if let Some(api_url) = var("API_URL") {
            self.api_url = api_url
                .parse()
                .wrap_err_with(|| format!("Error parsing `API_URL` {:?}", api_url))?;
        }
        if let Some(count) = var("COUNT") {
            self.page_size = count
                .parse()
                .wrap_err_with(|| format!("Error parsing `COUNT` {:?}", count))?;
        }
        if let Some(listen_address) = var("LISTEN_ADDR") {
            self.listen_address = listen_address
                .parse()
                .wrap_err_with(|| format!("Error parsing `LISTEN_ADDR` {:?}", listen_address))?;
        }
        Ok(())
    }

    /// Check the options are consistent. A default page size missing from
    /// [`Options::page_size_options`] is added to them.
    fn validate(&mut self) -> eyre::Result<()> {
        if self.page_size == 0 {
            return Err(eyre::eyre!("`page_size` must be greater than zero"))
                .suggestion("Check the `COUNT` environment variable and `page_size` option.");
        }
        if self.page_size_options.contains(&0) {
            eyre::bail!("`page_size_options` must not contain zero");
        }
        if !self.page_size_options.contains(&self.page_size) {
            self.page_size_options.push(self.page_size);
            self.page_size_options.sort_unstable();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, time::Duration};

    use super::Options;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn deserialize_defaults() {
        let options: Options = ron::from_str("(data_dir: \"data\")").unwrap();
        assert_eq!("http://localhost:8080/", options.api_url.as_str());
        assert_eq!(100, options.page_size);
        assert_eq!(vec![10, 50, 100, 500, 1000], options.page_size_options);
        assert_eq!(10000, options.row_count);
        assert_eq!(chrono_tz::Tz::Asia__Tokyo, options.timezone);
        assert_eq!(Duration::from_secs(30), options.request_timeout);
    }

    #[test]
    fn deserialize_options() {
        let options: Options = ron::from_str(
            r#"(
                api_url: "https://charts.example.com/api",
                page_size: 50,
                timezone: "UTC",
                request_timeout: "1m 30s",
            )"#,
        )
        .unwrap();
        assert_eq!("https://charts.example.com/api", options.api_url.as_str());
        assert_eq!(50, options.page_size);
        assert_eq!(chrono_tz::Tz::UTC, options.timezone);
        assert_eq!(Duration::from_secs(90), options.request_timeout);
    }

    #[test]
    fn environment_overrides() {
        let mut options = Options::default();
        options
            .apply_overrides(vars(&[
                ("API_URL", "http://listing:9000"),
                ("COUNT", "500"),
                ("LISTEN_ADDR", "0.0.0.0:8000"),
            ]))
            .unwrap();
        assert_eq!("http://listing:9000/", options.api_url.as_str());
        assert_eq!(500, options.page_size);
        assert_eq!("0.0.0.0:8000", options.listen_address.to_string());

        let mut options = Options::default();
        assert!(options
            .apply_overrides(vars(&[("COUNT", "many")]))
            .is_err());
    }

    #[test]
    fn validate_page_size() {
        let mut options = Options {
            page_size: 0,
            ..Options::default()
        };
        assert!(options.validate().is_err());

        let mut options = Options {
            page_size: 25,
            ..Options::default()
        };
        options.validate().unwrap();
        assert_eq!(vec![10, 25, 50, 100, 500, 1000], options.page_size_options);
    }
}
