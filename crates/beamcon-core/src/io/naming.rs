use std::path::{Path, PathBuf};

fn file_name(input: &Path) -> String {
    input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Directory outputs of `input` go to: `outdir` if given, else beside the input.
pub fn output_dir(input: &Path, outdir: Option<&Path>) -> PathBuf {
    if let Some(dir) = outdir {
        return dir.to_path_buf();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<prefix><stem>.<suffix>.fits` for a 2-D image.
pub fn image_output_name(input: &Path, prefix: Option<&str>, suffix: &str) -> String {
    let name = file_name(input);
    let stem = name.strip_suffix(".fits").unwrap_or(&name);
    format!("{}{stem}.{suffix}.fits", prefix.unwrap_or_default())
}

/// `<prefix>sm-<mode>.<name>` for a cube.
pub fn cube_output_name(input: &Path, prefix: Option<&str>, mode: &str) -> String {
    format!("{}sm-{mode}.{}", prefix.unwrap_or_default(), file_name(input))
}
