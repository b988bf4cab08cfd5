pub mod api_token;
pub mod auth;
pub mod cache;
pub mod contents;
pub mod courses;
pub mod enrollment;
pub mod markdown;
pub mod media;
pub mod modules;
pub mod ordering;
pub mod series;
pub mod slug;
