//! croftd: the HTTP-facing front half of the IMS subscriber data service.
//!
//! The daemon bridges the call controller's HTTP queries to two backends:
//! the HSS, reached over a Diameter/Cx session, and a wide-column subscriber
//! cache. The interesting part is the request orchestration in [`handlers`]:
//! for every request it decides what to read from the cache, which Diameter
//! exchange (if any) to issue, how to merge the results, and what to write
//! back or invalidate.

pub mod config;
pub mod context;
pub mod handlers;
pub mod hss;
pub mod server;

pub use config::Config;
pub use context::{AppContext, SharedContext};
