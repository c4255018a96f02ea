pub mod upload_processor;
