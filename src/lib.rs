pub mod data {
    pub mod builders {
        pub mod receipt_builder;
    }
    pub mod codec {
        pub(crate) mod der_reader;
        pub mod field_decoder;
        pub mod field_encoder;
    }
    pub(crate) mod datasources {
        pub(crate) mod verify_receipt_datasource;
    }
    pub mod interpreters {
        pub mod verification_interpreter;
    }
    pub(crate) mod models {
        pub(crate) mod verify_receipt {
            pub(crate) mod common;
            pub(crate) mod request_body_model;
            pub(crate) mod response_body_model;
        }
    }
    pub(crate) mod repositories {
        pub(crate) mod receipt_repository_impl;
    }
}

pub mod domain {
    pub mod entities {
        pub mod field_record;
        pub mod receipt;
        pub mod verification_request;
        pub mod verification_result;
    }
    pub mod repositories {
        pub mod receipt_repository;
    }
}

pub mod presentation {
    pub mod report;
    pub mod summary;
    pub mod web_ui;
}

pub mod constants;
pub mod errors;
pub mod fault_server;
pub mod secrets;
pub mod util;
