pub mod dead_letter_message;
pub mod image_file;
