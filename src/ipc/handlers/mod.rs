pub mod community;
pub mod content;
pub mod core;
pub mod import_roster;
pub mod persons;
pub mod roster;
pub mod sections;
