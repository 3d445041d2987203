pub mod channel;
pub mod userctx;
