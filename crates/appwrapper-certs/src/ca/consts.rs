use appwrapper_shared::time::Duration;

/// The default CA validity time span of one hour.
pub const DEFAULT_CA_VALIDITY: Duration = Duration::from_hours_unchecked(1);

/// The default leaf certificate validity time span of 15 minutes.
pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::from_minutes_unchecked(15);

/// The root CA subject name containing only the common name.
pub const SDP_ROOT_CA_SUBJECT: &str = "CN=AppWrapper Webhook Internal CA";

/// Line ending used when PEM-encoding keys.
pub const PEM_LINE_ENDING: p256::pkcs8::LineEnding = p256::pkcs8::LineEnding::LF;
