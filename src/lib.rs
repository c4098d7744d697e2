pub mod acquisition;
pub mod almanac;
pub mod bitsync;
pub mod code;
pub mod config;
pub mod constants;
#[cfg(feature = "live-capture")]
pub mod device;
pub mod ephemeris;
pub mod errors;
pub mod events;
pub mod frame;
pub mod gold_code;
pub mod iono;
#[cfg(feature = "live-capture")]
pub mod network;
pub mod receiver;
pub mod recording;
pub mod solver;
pub mod tracker;
pub mod types;
pub mod util;
