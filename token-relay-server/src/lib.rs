mod metrics;
mod pipeline;
mod scanners;
mod server;
mod settings;

pub use server::run;
pub use settings::Settings;
