pub mod entity_handlers;
pub mod form;
pub mod health_handlers;
pub mod image_handlers;
