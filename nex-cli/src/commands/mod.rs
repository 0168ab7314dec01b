pub mod info;
pub mod init;
pub mod install;
pub mod login;
pub mod publish;
pub mod review;
pub mod search;
pub mod versions;
