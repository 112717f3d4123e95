pub mod dispatcher;
pub mod worker;
