//! # Portico: profile-aware dependency injection for hexagonal apps
//!
//! Bind contracts (ports) to implementations (adapters) per environment
//! profile, resolve them with singleton, scoped or transient lifetimes,
//! and start/stop lifecycle components in dependency order.
//!
//! ```rust
//! use std::sync::Arc;
//! use portico::prelude::*;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct SystemClock;
//! impl Clock for SystemClock {
//!     fn now(&self) -> u64 { 1 }
//! }
//!
//! struct FrozenClock;
//! impl Clock for FrozenClock {
//!     fn now(&self) -> u64 { 0 }
//! }
//!
//! let container = Container::builder()
//!     .profile(Profile::TEST)
//!     .bind(
//!         Binding::<dyn Clock, SystemClock>::new(|_| Ok(SystemClock), |c| c as Arc<dyn Clock>)
//!             .profile(Profile::PRODUCTION),
//!     )
//!     .bind(
//!         Binding::<dyn Clock, FrozenClock>::new(|_| Ok(FrozenClock), |c| c as Arc<dyn Clock>)
//!             .profile(Profile::TEST),
//!     )
//!     .build()?;
//!
//! assert_eq!(container.resolve::<dyn Clock>()?.now(), 0);
//! # Ok::<(), portico::PorticoError>(())
//! ```

pub mod logging;

pub use portico_container::*;
pub use portico_support::*;
