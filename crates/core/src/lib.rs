//! Person re-identification core.
//!
//! Maps ephemeral per-video tracker IDs onto persistent human identities
//! via nearest-neighbor search over a gallery of appearance embeddings,
//! and keeps each identity's gallery bounded with a diversity-maximizing
//! eviction policy.

pub mod shared {
    pub mod bounding_box;
    pub mod config;
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod validation;
    pub mod video_metadata;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure {
        pub mod ffmpeg_reader;
    }
}

pub mod detection {
    pub mod domain {
        pub mod detection_error;
        pub mod embedding_extractor;
        pub mod person_tracker;
    }
    pub mod infrastructure;
}

pub mod gallery {
    pub mod domain {
        pub mod crop_storage;
        pub mod diversity_selector;
        pub mod embedding;
        pub mod gallery_entry;
        pub mod gallery_store;
        pub mod identity;
    }
    pub mod infrastructure;
}

pub mod resolution {
    pub mod identity_resolver;
    pub mod session_state;
}

pub mod pipeline {
    pub mod best_crop_use_case;
    pub mod scan_error;
    pub mod scan_logger;
    pub mod scan_video_use_case;
}
