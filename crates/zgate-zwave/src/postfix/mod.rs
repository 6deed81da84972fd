//! Postfix rules: per-product fixes applied while mapping command classes.
//!
//! A fix is selected by `p_id`, which is the manufacturer id, the
//! `manufacturer.productType.productId` triple, or that triple followed by
//! the application major (and minor) version. All matching fixes apply,
//! least specific first.

pub mod directive;
pub mod expr;
pub mod store;

pub use directive::{
    ChangeVDev, ConfigVDev, Directive, DirectiveScope, DiscreteState, PreInterviewCall, VDevChange,
};
pub use expr::{Expr, Value as ExprValue, Vars};
pub use store::{DeviceIdentity, FixRecord, PostfixFile, PostfixStore, CUSTOM_OBJECT, UPDATED_OBJECT};
