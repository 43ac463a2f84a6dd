//! Reader and writer for the Flow Cytometry Standard (FCS) binary file
//! format, versions 2.0, 3.0 and 3.1.
//!
//! ```no_run
//! use std::fs::File;
//! use fcsio::{open, ReadOptions};
//!
//! let mut f = File::open("sample.fcs").unwrap();
//! let data_set = open(&mut f, &ReadOptions::new()).unwrap();
//! let matrix = data_set.as_array(true).unwrap();
//! println!("{} events x {} channels", data_set.event_count, data_set.channel_count);
//! # let _ = matrix;
//! ```

mod channel;
mod config;
mod data;
mod dataset;
mod error;
mod header;
mod reader;
mod text;
mod writer;

pub use channel::{ChannelRole, ChannelSpec};
pub use config::ReadOptions;
pub use dataset::{open, read_multiple_data_sets, DataSet};
pub use error::{FcsError, FcsResult, Warning};
pub use header::{Header, Version};
pub use text::Metadata;
pub use writer::create_fcs;
