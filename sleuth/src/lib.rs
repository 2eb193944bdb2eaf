pub mod handlers;

pub use handlers::{
    build_scan_options, load_catalog, load_targets_from_file, load_targets_from_source,
    output_path_for, parse_target_line, render_catalog,
};

// Re-export scan functionality from sleuth-core
pub use sleuth_core::{ScanOptions, ScanReport, execute_scan};
