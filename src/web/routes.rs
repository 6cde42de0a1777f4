//! Bait endpoints
//!
//! Each bait takes the already-extracted request data and returns the canned
//! response plus the one-line interaction description that becomes the event
//! payload. None of them can fail.

use axum::http::header;
use axum::response::{Html, IntoResponse, Response};

const ADMIN_LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Admin Login</title></head>
<body>
    <h2>Admin Panel</h2>
    <form method='POST' action='admin.php'>
        User: <input name='user'/><br/>
        Pass: <input name='pass' type='password'/><br/>
        <input type='submit'/>
    </form>
</body>
</html>
"#;

const UPLOAD_PAGE: &str = "<form method='POST' enctype='multipart/form-data'>File: <input type='file' name='upload'/><br/><input type='submit'/></form>\n";

/// SQL-injection bait: pretend to run the query, find nothing
pub(super) fn search_results(q: &str) -> (Response, String) {
    (
        format!("Results for '{}': No results found.", q).into_response(),
        format!("Search query: {}", q),
    )
}

/// XSS bait: reflect the comment unescaped, as the vulnerable page it
/// impersonates would
pub(super) fn comment_posted(msg: &str) -> (Response, String) {
    (
        Html(format!("<p>{}</p>", msg)).into_response(),
        format!("XSS comment: {}", msg),
    )
}

pub(super) fn admin_login_form() -> (Response, String) {
    (
        Html(ADMIN_LOGIN_PAGE).into_response(),
        "Admin.php login form served".to_string(),
    )
}

pub(super) fn admin_login_attempt(user: &str, pass: &str) -> (Response, String) {
    (
        "Access Denied.\n".into_response(),
        format!("Admin.php login attempt: {} / {}", user, pass),
    )
}

pub(super) fn upload_page() -> (Response, String) {
    (
        Html(UPLOAD_PAGE).into_response(),
        "Upload form served".to_string(),
    )
}

/// `received` is the (filename, size) of the submitted file, if the
/// multipart body yielded one
pub(super) fn upload_result(received: Option<(String, usize)>) -> (Response, String) {
    match received {
        Some((filename, size)) => (
            "File received.\n".into_response(),
            format!("File uploaded: {} ({} bytes)", filename, size),
        ),
        None => (
            "Upload failed.\n".into_response(),
            "Upload error".to_string(),
        ),
    }
}

pub(super) fn leaked_config() -> (Response, String) {
    (
        "DB_PASS=supersecret\nAPI_KEY=12345-ABCDE\n".into_response(),
        "Config file accessed".to_string(),
    )
}

pub(super) fn robots() -> (Response, String) {
    (
        "User-agent: *\nDisallow: /backup\nDisallow: /admin\n".into_response(),
        "robots.txt requested".to_string(),
    )
}

pub(super) fn backup_archive() -> (Response, String) {
    (
        (
            [(header::CONTENT_DISPOSITION, "attachment; filename=backup.zip")],
            "FAKE_ZIP_CONTENT",
        )
            .into_response(),
        "Backup.zip requested".to_string(),
    )
}

/// Fake web shell: echoes one asterisk per submitted byte
pub(super) fn shell_output(cmd: &str) -> (Response, String) {
    (
        format!("Output: {}", "*".repeat(cmd.len())).into_response(),
        format!("Web shell command: {}", cmd),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_description_carries_raw_query() {
        let (_, info) = search_results("' OR 1=1");
        assert_eq!(info, "Search query: ' OR 1=1");
    }

    #[test]
    fn upload_result_distinguishes_success_and_failure() {
        let (_, ok) = upload_result(Some(("a.bin".to_string(), 42)));
        assert_eq!(ok, "File uploaded: a.bin (42 bytes)");

        let (_, err) = upload_result(None);
        assert_eq!(err, "Upload error");
    }

    #[test]
    fn shell_output_masks_every_byte() {
        let (_, info) = shell_output("cat /etc/passwd");
        assert_eq!(info, "Web shell command: cat /etc/passwd");
    }
}
