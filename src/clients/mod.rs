pub mod profile_client;
pub mod route_directory;
