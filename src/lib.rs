#![allow(clippy::new_without_default)]

pub mod runtime;

pub mod prelude {
    pub use crate::runtime::prelude::*;
}
