use std::path::Path;

/// HTML shell for the rendered report. The model returns a bare HTML
/// fragment; these wrap it into a styled standalone document.
pub fn html_start(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
  :root {{
    --main-color: #0047AB;
    --secondary-color: #6495ED;
  }}
  body {{
    font-family: "Segoe UI", Tahoma, Geneva, Verdana, sans-serif;
    padding: 20px;
  }}
  h1 {{ color: #333; }}
  h2 {{ color: var(--main-color); }}
  h3 {{ color: var(--secondary-color); }}
  table {{
    width: 100%;
    border-collapse: collapse;
    margin-top: 20px;
  }}
  li {{ padding: 4px; }}
  th, td {{
    padding: 12px;
    border: 1px solid #ccc;
    text-align: left;
    vertical-align: top;
  }}
  th {{
    background: #6888BE;
    color: white;
  }}
  tr:nth-child(even) {{ background: #f9f9f9; }}
  pre {{
    background: #272822;
    color: #f8f8f2;
    padding: 10px;
    border-radius: 5px;
    overflow-x: auto;
  }}
  pre, code {{
    font-size: .9rem;
    font-family: 'Fira Code', 'Courier New', monospace;
  }}
</style>
</head>
<body>
<h1>{title}</h1>
"#
    )
}

pub fn html_end() -> &'static str {
    "</body></html>\n"
}

/// Wrap a model-produced fragment into a complete document.
pub fn wrap_fragment(title: &str, fragment: &str) -> String {
    let mut document = html_start(title);
    document.push_str(fragment.trim());
    document.push('\n');
    document.push_str(html_end());
    document
}

/// Write the finished report to disk.
pub fn save_report(path: &Path, title: &str, fragment: &str) -> std::io::Result<()> {
    std::fs::write(path, wrap_fragment(title, fragment))?;
    tracing::info!(path = %path.display(), "report saved");
    Ok(())
}
