//! Bakes the `.env` settings into the firmware image and sets up linking.

const SETTINGS: [&str; 7] = [
    "AIRMON_WIFI_SSID",
    "AIRMON_WIFI_PASSWORD",
    "AIRMON_HOSTNAME",
    "AIRMON_PORT",
    "AIRMON_METRICS_PATH",
    "AIRMON_MAX_SILENCE_SECS",
    "AIRMON_CHECK_INTERVAL_SECS",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");

    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=no .env loaded ({e}), using defaults");
    }

    for key in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_default();
        println!("cargo:rustc-env={key}={value}");
    }

    if std::env::var("AIRMON_WIFI_SSID").unwrap_or_default().is_empty() {
        println!("cargo:warning=AIRMON_WIFI_SSID is empty, the device will not join a network");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
