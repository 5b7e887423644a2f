//! Parametric effects
//!
//! - **engine**: parameter draws and deterministic rendering (echo, tempo,
//!   pitch, low-pass)
//! - **echo**: echo generator and echo fold
//! - **time_scale**: tempo / pitch collaborator trait and the built-in OLA scaler
//! - **phone_band**: telephone band-pass channel

pub mod echo;
pub mod engine;
pub mod phone_band;
pub mod time_scale;

pub use engine::{EchoParameters, EffectEngine, EffectParameters, LowPassParameters};
pub use phone_band::{apply_phone_band, PhoneBandParameters};
pub use time_scale::{OlaTimeScaler, TimeScaler};
