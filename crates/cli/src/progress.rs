use indicatif::{ProgressBar, ProgressStyle};

/// Byte-counting bar for a transfer of `total` bytes to `target`.
pub fn create_bytes_progress(total: u64, target: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/dim}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(target.to_string());
    pb
}
