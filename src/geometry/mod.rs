pub(crate) mod orientation;
pub(crate) mod resolve;
