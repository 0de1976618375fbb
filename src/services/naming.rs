use std::path::Path;
use uuid::Uuid;

/// Generated blob names for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobNames {
    pub source: String,
    pub output: String,
}

/// Build collision-resistant source/output names.
///
/// The stem comes from the client filename when it has usable characters,
/// otherwise a random uuid. A random suffix is always appended.
pub fn blob_names(client_filename: Option<&str>, extension: &str) -> BlobNames {
    let suffix = Uuid::new_v4().simple().to_string();
    let base = match client_filename.and_then(sanitized_stem) {
        Some(stem) => format!("{stem}_{suffix}"),
        None => suffix,
    };

    BlobNames {
        source: format!("{base}.{extension}"),
        output: format!("{base}_processed.{extension}"),
    }
}

fn sanitized_stem(filename: &str) -> Option<String> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let clean: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();

    if clean.chars().all(|c| c == '_') {
        None
    } else {
        Some(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_from_client_name() {
        let names = blob_names(Some("holiday photo.JPG"), "jpeg");
        assert!(names.source.starts_with("holiday_photo_"));
        assert!(names.source.ends_with(".jpeg"));
        assert!(names.output.ends_with("_processed.jpeg"));
        assert_eq!(
            names.output.trim_end_matches("_processed.jpeg"),
            names.source.trim_end_matches(".jpeg")
        );
    }

    #[test]
    fn test_random_stem_without_client_name() {
        let names = blob_names(None, "png");
        assert_eq!(names.source.len(), 32 + ".png".len());

        let names = blob_names(Some("???.png"), "png");
        assert_eq!(names.source.len(), 32 + ".png".len());
    }

    #[test]
    fn test_path_components_are_dropped() {
        let names = blob_names(Some("../../etc/passwd.png"), "png");
        assert!(names.source.starts_with("passwd_"));
        assert!(!names.source.contains('/'));
    }

    #[test]
    fn test_same_client_name_never_collides() {
        let a = blob_names(Some("cat.png"), "png");
        let b = blob_names(Some("cat.png"), "png");
        assert_ne!(a.source, b.source);
        assert_ne!(a.output, b.output);
    }
}
