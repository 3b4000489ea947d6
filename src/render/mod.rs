pub(crate) mod buffer_pool;
pub(crate) mod composite;
pub(crate) mod warp;
