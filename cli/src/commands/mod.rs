pub mod init;
pub mod publish;
pub mod run;
