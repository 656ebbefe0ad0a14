pub mod dispatcher;
pub mod gateway;
pub mod request;
pub mod response;
pub mod session;
pub mod worker;
