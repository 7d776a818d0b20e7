pub mod descriptor;
pub mod media;
pub mod settings;
