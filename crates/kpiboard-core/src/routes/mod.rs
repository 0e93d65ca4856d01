//! Route guards and navigation.
//!
//! The guards are pure functions of the session snapshot. Until the startup
//! session check has finished every route resolves to `Outcome::Loading`;
//! afterwards each route's `Guard` decides between rendering and a
//! history-replacing redirect.
//!
//! | Route        | Guard          |
//! |--------------|----------------|
//! | `/`          | root redirect  |
//! | `/home`      | open           |
//! | `/login`     | public only    |
//! | `/register`  | public only    |
//! | `/dashboard` | protected      |

pub mod guard;
pub mod navigator;

pub use guard::{brand_target, gate, protected, public_only, resolve, root_redirect, Guard, Outcome, Route};
pub use navigator::{HardRedirect, Navigator};
