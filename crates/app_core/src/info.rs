//! One-line description of the current item

use crate::item::Size;
use std::fmt;

/// Names longer than this are shortened in the middle
const MAX_NAME_CHARS: usize = 95;
const NAME_TAIL_CHARS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Zero-based position; displayed one-based
    pub position: usize,
    pub count: usize,
    pub name: String,
    pub size: Option<Size>,
    pub file_size: u64,
}

impl ImageInfo {
    pub fn display_name(&self) -> String {
        abbreviate(&self.name)
    }
}

impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ {}/{} ]   {}  (", self.position + 1, self.count, self.display_name())?;
        if let Some(size) = self.size {
            write!(f, "{}x{}  ", size.width, size.height)?;
        }
        write!(f, "{} KB)", self.file_size / 1024)
    }
}

fn abbreviate(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= MAX_NAME_CHARS {
        return name.to_string();
    }
    let head: String = chars[..MAX_NAME_CHARS].iter().collect();
    let tail: String = chars[chars.len() - NAME_TAIL_CHARS..].iter().collect();
    format!("{} (...) {}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let info = ImageInfo {
            position: 2,
            count: 10,
            name: "cat.png".into(),
            size: Some(Size::new(640, 480)),
            file_size: 20480,
        };
        assert_eq!(info.to_string(), "[ 3/10 ]   cat.png  (640x480  20 KB)");

        let video = ImageInfo { size: None, ..info };
        assert_eq!(video.to_string(), "[ 3/10 ]   cat.png  (20 KB)");
    }

    #[test]
    fn test_long_name_is_abbreviated() {
        let name = format!("{}{}", "a".repeat(100), "_tail_end.jpg");
        let short = abbreviate(&name);
        assert!(short.starts_with(&"a".repeat(95)));
        assert!(short.contains(" (...) "));
        assert!(short.ends_with(" tail_end.jpg"));
        assert_eq!(short.chars().count(), 95 + 7 + 12);
    }
}
