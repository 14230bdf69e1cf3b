//! Video file selection (pure functions, easy to unit test)

use crate::model::FileDescriptor;

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "wmv", "m4v"];

/// True when the substring after the last `.` is a recognized video extension.
pub fn is_video_path(path: &str) -> bool {
    match path.rsplit_once('.') {
        Some((_, ext)) => VIDEO_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known)),
        None => false,
    }
}

/// Pick the largest recognized video file; the first one wins on equal sizes.
pub fn select_best_video(files: &[FileDescriptor]) -> Option<&FileDescriptor> {
    files
        .iter()
        .filter(|f| is_video_path(&f.path))
        .fold(None, |best: Option<&FileDescriptor>, f| match best {
            Some(b) if b.size_bytes >= f.size_bytes => Some(b),
            _ => Some(f),
        })
}
