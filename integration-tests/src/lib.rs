//! Scripted components shared by the cross-crate tests.

pub mod test_components;
