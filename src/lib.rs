pub mod api;
pub mod appsettings;
