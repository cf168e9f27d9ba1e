//! Clients for the Open-Meteo elevation and historical archive APIs.

use crate::config::RunnerConfig;
use crate::pacing::Throttle;
use crate::{Result, RunnerError};
use chrono::{Days, NaiveDate};
use hrib_terrain::GeoPoint;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

const ELEVATION_SERVICE: &str = "elevation API";
const ARCHIVE_SERVICE: &str = "soil archive API";

/// Point elevation lookup.
pub trait ElevationApi: Send + Sync {
    /// Ground elevation at a point in meters.
    fn elevation_m(&self, point: &GeoPoint) -> Result<f64>;
}

/// Daily soil history lookup.
pub trait SoilApi: Send + Sync {
    /// Daily series ending on `end_date` (inclusive).
    fn history(&self, point: &GeoPoint, end_date: NaiveDate) -> Result<SoilHistory>;
}

/// Daily series returned by the archive, keyed by variable name.
#[derive(Debug, Clone, PartialEq)]
pub struct SoilHistory {
    /// The `daily` object: `time` plus one array per requested variable.
    pub daily: Map<String, Value>,
    /// Request URL that produced this history.
    pub url: String,
}

impl SoilHistory {
    /// Wrap a `daily` object, checking that it has a `time` axis.
    pub fn new(daily: Map<String, Value>, url: String) -> Result<Self> {
        if !daily.get("time").is_some_and(Value::is_array) {
            return Err(RunnerError::MalformedResponse {
                service: ARCHIVE_SERVICE,
                reason: "daily.time is missing".to_string(),
            });
        }
        Ok(Self { daily, url })
    }

    /// The date axis (`daily.time`).
    pub fn dates(&self) -> Value {
        self.daily.get("time").cloned().unwrap_or(Value::Array(Vec::new()))
    }

    /// One variable's series, or an empty array when the archive omitted it.
    pub fn series(&self, variable: &str) -> Value {
        self.daily
            .get(variable)
            .cloned()
            .unwrap_or(Value::Array(Vec::new()))
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder().timeout(timeout).build()?)
}

fn get_json(client: &reqwest::blocking::Client, service: &'static str, url: &str) -> Result<Value> {
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(RunnerError::RemoteStatus {
            service,
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let body = response.text()?;
    Ok(serde_json::from_str(&body)?)
}

/// `https://api.open-meteo.com/v1/elevation` client.
#[derive(Debug)]
pub struct OpenMeteoElevation {
    client: reqwest::blocking::Client,
    base_url: String,
    throttle: Throttle,
}

impl OpenMeteoElevation {
    /// Client for a custom endpoint.
    pub fn new(base_url: impl Into<String>, timeout: Duration, throttle: Throttle) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            throttle,
        })
    }

    /// Client configured from a [`RunnerConfig`].
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        Self::new(
            config.elevation_url.clone(),
            Duration::from_secs(config.elevation_timeout_secs),
            Throttle::new(config.request_delay()),
        )
    }

    /// Request URL for a point.
    pub fn request_url(&self, point: &GeoPoint) -> String {
        format!(
            "{}?latitude={:?}&longitude={:?}",
            self.base_url, point.latitude, point.longitude
        )
    }
}

/// Pull `elevation[0]` out of an elevation API response.
pub fn parse_elevation(body: &Value) -> Result<f64> {
    body.get("elevation")
        .and_then(|e| e.get(0))
        .and_then(Value::as_f64)
        .ok_or_else(|| RunnerError::MalformedResponse {
            service: ELEVATION_SERVICE,
            reason: "expected a numeric elevation[0]".to_string(),
        })
}

impl ElevationApi for OpenMeteoElevation {
    fn elevation_m(&self, point: &GeoPoint) -> Result<f64> {
        let url = self.request_url(point);
        self.throttle.wait();
        debug!(%url, "requesting elevation");
        let body = get_json(&self.client, ELEVATION_SERVICE, &url)?;
        parse_elevation(&body)
    }
}

/// `https://archive-api.open-meteo.com/v1/archive` client for daily soil variables.
#[derive(Debug)]
pub struct OpenMeteoArchive {
    client: reqwest::blocking::Client,
    base_url: String,
    timezone: String,
    temperature_unit: String,
    history_days: u32,
    variables: Vec<String>,
    throttle: Throttle,
}

impl OpenMeteoArchive {
    /// Client configured from a [`RunnerConfig`].
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.soil_timeout_secs))?,
            base_url: config.archive_url.clone(),
            timezone: config.timezone.clone(),
            temperature_unit: config.temperature_unit.clone(),
            history_days: config.history_days,
            variables: config.soil_variables.clone(),
            throttle: Throttle::new(config.request_delay()),
        })
    }

    /// Request URL for a point and the window ending on `end_date`.
    pub fn request_url(&self, point: &GeoPoint, end_date: NaiveDate) -> String {
        let start_date = history_start(end_date, self.history_days);
        format!(
            "{}?latitude={:?}&longitude={:?}&start_date={}&end_date={}&daily={}&timezone={}&temperature_unit={}",
            self.base_url,
            point.latitude,
            point.longitude,
            start_date,
            end_date,
            self.variables.join(","),
            self.timezone,
            self.temperature_unit
        )
    }
}

/// First day of a `days`-long window ending on `end_date`.
pub fn history_start(end_date: NaiveDate, days: u32) -> NaiveDate {
    end_date
        .checked_sub_days(Days::new(days.saturating_sub(1) as u64))
        .unwrap_or(NaiveDate::MIN)
}

impl SoilApi for OpenMeteoArchive {
    fn history(&self, point: &GeoPoint, end_date: NaiveDate) -> Result<SoilHistory> {
        let url = self.request_url(point, end_date);
        self.throttle.wait();
        debug!(%url, "requesting soil history");
        let body = get_json(&self.client, ARCHIVE_SERVICE, &url)?;

        match body.get("daily") {
            Some(Value::Object(daily)) => SoilHistory::new(daily.clone(), url),
            _ => Err(RunnerError::MalformedResponse {
                service: ARCHIVE_SERVICE,
                reason: "daily object is missing".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point() -> GeoPoint {
        GeoPoint::new(47.6062, -122.3321).unwrap()
    }

    #[test]
    fn test_history_window_is_inclusive() {
        let end = NaiveDate::from_ymd_opt(2023, 5, 14).unwrap();
        assert_eq!(history_start(end, 14), NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        assert_eq!(history_start(end, 1), end);
    }

    #[test]
    fn test_archive_url() {
        let archive = OpenMeteoArchive::from_config(&RunnerConfig::default()).unwrap();
        let url = archive.request_url(&point(), NaiveDate::from_ymd_opt(2023, 3, 5).unwrap());
        assert_eq!(
            url,
            "https://archive-api.open-meteo.com/v1/archive?latitude=47.6062&longitude=-122.3321\
             &start_date=2023-02-20&end_date=2023-03-05\
             &daily=soil_temperature_0_to_7cm_mean,soil_temperature_7_to_28cm_mean,\
             soil_temperature_28_to_100cm_mean,soil_temperature_0_to_100cm_mean,\
             soil_moisture_0_to_7cm_mean,soil_moisture_7_to_28cm_mean,\
             soil_moisture_28_to_100cm_mean,soil_moisture_0_to_100cm_mean\
             &timezone=America/Los_Angeles&temperature_unit=fahrenheit"
        );
    }

    #[test]
    fn test_elevation_url() {
        let api = OpenMeteoElevation::from_config(&RunnerConfig::default()).unwrap();
        assert_eq!(
            api.request_url(&GeoPoint::new(45.0, -121.5).unwrap()),
            "https://api.open-meteo.com/v1/elevation?latitude=45.0&longitude=-121.5"
        );
    }

    #[test]
    fn test_parse_elevation() {
        assert_eq!(parse_elevation(&json!({"elevation": [812.0]})).unwrap(), 812.0);
        assert!(matches!(
            parse_elevation(&json!({"elevation": []})),
            Err(RunnerError::MalformedResponse { .. })
        ));
        assert!(parse_elevation(&json!({"error": true, "reason": "bad"})).is_err());
    }

    #[test]
    fn test_soil_history_accessors() {
        let daily = json!({
            "time": ["2023-05-01", "2023-05-02"],
            "soil_moisture_0_to_7cm_mean": [0.31, 0.29]
        });
        let Value::Object(daily) = daily else { unreachable!() };
        let history = SoilHistory::new(daily, "u".into()).unwrap();

        assert_eq!(history.dates(), json!(["2023-05-01", "2023-05-02"]));
        assert_eq!(history.series("soil_moisture_0_to_7cm_mean"), json!([0.31, 0.29]));
        assert_eq!(history.series("soil_moisture_7_to_28cm_mean"), json!([]));
    }

    #[test]
    fn test_soil_history_requires_time() {
        assert!(matches!(
            SoilHistory::new(Map::new(), "u".into()),
            Err(RunnerError::MalformedResponse { .. })
        ));
    }

    /// Answer one HTTP request on a loopback port; returns the base URL.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        base
    }

    fn local_elevation(base: String) -> OpenMeteoElevation {
        OpenMeteoElevation::new(base, Duration::from_secs(5), Throttle::disabled()).unwrap()
    }

    fn local_archive(base: String) -> OpenMeteoArchive {
        let config = RunnerConfig {
            archive_url: base,
            request_delay_ms: 0,
            ..RunnerConfig::default()
        };
        OpenMeteoArchive::from_config(&config).unwrap()
    }

    #[test]
    fn test_elevation_service_unavailable() {
        let client = local_elevation(serve_once("503 Service Unavailable", "{}"));
        let err = client.elevation_m(&point()).unwrap_err();
        assert!(matches!(
            err,
            RunnerError::RemoteStatus { service: ELEVATION_SERVICE, status: 503, .. }
        ));
        assert_eq!(err.kind(), crate::FailureKind::Remote);
    }

    #[test]
    fn test_elevation_over_http() {
        let client = local_elevation(serve_once("200 OK", r#"{"elevation":[812.0]}"#));
        assert_eq!(client.elevation_m(&point()).unwrap(), 812.0);
    }

    #[test]
    fn test_archive_service_unavailable() {
        let base = serve_once("503 Service Unavailable", "{}");
        let client = local_archive(base.clone());
        let end = NaiveDate::from_ymd_opt(2023, 5, 10).unwrap();
        match client.history(&point(), end) {
            Err(RunnerError::RemoteStatus { service, status, url }) => {
                assert_eq!(service, ARCHIVE_SERVICE);
                assert_eq!(status, 503);
                assert!(url.starts_with(&base));
            }
            other => panic!("expected RemoteStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_archive_without_daily_is_malformed() {
        let client = local_archive(serve_once("200 OK", r#"{"latitude":45.0}"#));
        let end = NaiveDate::from_ymd_opt(2023, 5, 10).unwrap();
        assert!(matches!(
            client.history(&point(), end),
            Err(RunnerError::MalformedResponse { service: ARCHIVE_SERVICE, .. })
        ));
    }
}
