use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
