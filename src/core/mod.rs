pub mod assistants;
pub mod datastore;
pub mod orchestrator;
pub mod personas;
pub mod projects;
pub mod router;
pub mod tools;
