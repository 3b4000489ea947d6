pub(crate) mod backend;
pub(crate) mod bitrate;
pub(crate) mod ffmpeg;
pub(crate) mod memory;
pub(crate) mod probe;
pub(crate) mod track;
