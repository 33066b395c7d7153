pub mod redirect;
pub mod site;
pub mod status;
pub mod sync;
pub mod teardown;
pub mod whoami;
