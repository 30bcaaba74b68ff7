use crate::network::HttpResponse;

const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline</title>
  <style>
    body { font-family: sans-serif; display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0; color: #444; }
    main { text-align: center; }
  </style>
</head>
<body>
  <main>
    <h1>You are offline</h1>
    <p>This slide has not been downloaded yet. It will load once the connection is back.</p>
  </main>
</body>
</html>
"#;

/// Placeholder document served for a slide that is neither cached nor reachable.
pub fn placeholder() -> HttpResponse {
  HttpResponse::new(200, "text/html; charset=utf-8", OFFLINE_HTML)
}
