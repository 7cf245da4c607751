mod buffer;
mod context;
mod error;
