//! Server routes, headers and protocol constants

/// Readiness probe, relative to the server base URL
pub const READY_ROUTE: &str = "";
/// Active measurement probe and fetch
pub const ACTIVE_MEASUREMENT_ROUTE: &str = "/measurements/active";
/// Reading submission for the active measurement
pub const READINGS_ROUTE: &str = "/measurements/active/readings";
/// Token issuing route
pub const LOGIN_ROUTE: &str = "/login";

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const SENSOR_DEVICE_HEADER: &str = "X-Flux-Sensor";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub const STATUS_OK: u16 = 200;
pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_NOT_FOUND: u16 = 404;

/// Readings accumulated before a batch is sent
pub const DEFAULT_MIN_BATCH_SIZE: usize = 3;

/// Local wall-clock, ISO-8601 without offset
pub const READING_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
