//! Operators
//!
//! Every operator is an inherent method or associated function on [`Maybe`]
//! or [`Flow`], defined in the module named after it. Operators building on
//! the coordinators (`merge`, `concat`, `flat_map`, `switch_map`, `zip`,
//! `retry`) share the drain loop described in the crate's coordinator
//! module, so synchronous sources never grow the stack.
//!
//! [`Maybe`]: crate::maybe::Maybe
//! [`Flow`]: crate::flow::Flow

pub mod amb;
pub mod block;
pub mod concat;
pub mod delay;
pub mod filter;
pub mod flat_map;
pub mod future;
pub mod map;
pub mod merge;
pub mod observe_on;
pub mod redo_when;
pub mod retry;
pub mod subscribe_on;
pub mod switch_map;
pub mod timeout;
pub mod to_flow;
pub mod unsubscribe_on;
pub mod using;
pub mod zip;
