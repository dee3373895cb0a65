/// Overrides the configured work root (slot directories live below it).
pub const WORK_DIR_ENV: &str = "MARPACK_WORK_DIR";

/// Overrides the configured output directory for published partials.
pub const OUTPUT_DIR_ENV: &str = "MARPACK_OUTPUT_DIR";

/// Locale of the reference build every complete MAR is repacked from.
pub const REFERENCE_LOCALE: &str = "en-US";

/// File name of the registry export written next to the published partials.
pub const REGISTRY_FILENAME: &str = "partials.json";

/// File name of the locale status export (`locale -> Success|Failed`).
pub const LOCALES_PROPERTY_FILENAME: &str = "locales.json";
