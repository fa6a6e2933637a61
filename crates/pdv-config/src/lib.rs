//! # pdv-config: Layered Configuration
//!
//! Every part of the terminal reads its settings through a
//! [`ConfigResolver`]: the equipment manager its serial parameters, the
//! local store its database path, the sync pass its endpoints.
//!
//! ```text
//! config/
//! ├── api.json              ◄── committed defaults
//! ├── database.json
//! ├── equipment.json
//! ├── logging.json
//! ├── ui.json
//! └── local_equipment.json  ◄── this terminal only, deep-merged on top
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_config::{resolve_config_dir, ConfigResolver};
//!
//! let config = ConfigResolver::load(resolve_config_dir(None));
//! let port = config.get("equipment", "scale.connection.port", "COM1");
//! ```

pub mod error;
pub mod merge;
pub mod resolver;

pub use error::{ConfigError, ConfigResult};
pub use merge::{deep_merge, merged};
pub use resolver::{resolve_config_dir, ConfigResolver, CONFIG_DIR_ENV, DOMAINS};
