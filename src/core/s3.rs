//! S3 URI helpers

pub const S3_SCHEME: &str = "s3://";

pub fn is_s3_uri(value: &str) -> bool {
    value.starts_with(S3_SCHEME)
}

/// Split `s3://bucket/key/path` into `("bucket", "key/path")`
pub fn split_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix(S3_SCHEME)?;
    match rest.split_once('/') {
        Some((bucket, key)) => Some((bucket, key)),
        None => Some((rest, "")),
    }
}

/// Bucket name without any `s3://` scheme or trailing slash
pub fn bucket_name(bucket: &str) -> &str {
    bucket
        .strip_prefix(S3_SCHEME)
        .unwrap_or(bucket)
        .trim_end_matches('/')
}

/// Join a bucket and path segments into an `s3://` URI
///
/// Empty segments are dropped and surrounding slashes are collapsed.
pub fn join(bucket: &str, segments: &[&str]) -> String {
    let mut uri = format!("{}{}", S3_SCHEME, bucket_name(bucket));
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        uri.push('/');
        uri.push_str(segment);
    }
    uri
}

/// Like [`join`], with a trailing slash
pub fn join_dir(bucket: &str, segments: &[&str]) -> String {
    let mut uri = join(bucket, segments);
    uri.push('/');
    uri
}
