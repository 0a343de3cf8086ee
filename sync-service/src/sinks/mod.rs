pub mod opinum;

pub use opinum::OpinumSink;
