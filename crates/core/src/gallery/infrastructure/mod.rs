pub mod exhaustive_diversity_selector;
pub mod file_crop_storage;
pub mod greedy_diversity_selector;
pub mod in_memory_crop_storage;
pub mod in_memory_gallery_store;
mod math;
