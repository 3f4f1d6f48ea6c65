//! Manager status page.

use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;

use crate::html;
use crate::record::ServerRecord;
use crate::registry::Manager;

/// Handle GET /.
pub(crate) async fn status_page(State(manager): State<Arc<Manager>>) -> Html<String> {
    let servers = manager.servers().await;
    Html(render(
        &servers,
        manager.live_reload_enabled(),
        manager.network_ip(),
    ))
}

fn render(servers: &[ServerRecord], live_reload: bool, network_ip: Option<Ipv4Addr>) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Webby</title></head><body>\n<h1>Webby</h1>\n",
    );

    let (state, action) = if live_reload {
        ("enabled", "Disable")
    } else {
        ("disabled", "Enable")
    };
    let _ = writeln!(
        page,
        "<p>Live reload is {state}. <a href=\"/toggle-livereload\">{action}</a></p>"
    );

    if servers.is_empty() {
        page.push_str("<p>No servers running.</p>\n");
    } else {
        let network_header = if network_ip.is_some() { "<th>Network</th>" } else { "" };
        let _ = writeln!(
            page,
            "<table>\n<tr><th>Port</th>{network_header}<th>Path</th><th></th></tr>"
        );
        for server in servers {
            let url = server.url_for(None);
            let network_cell = network_ip.map_or_else(String::new, |ip| {
                let lan_url = format!("http://{ip}:{}/", server.port);
                format!("<td><a href=\"{lan_url}\">{lan_url}</a></td>")
            });
            let _ = writeln!(
                page,
                "<tr><td><a href=\"{url}\">{port}</a></td>{network_cell}<td>{path}</td><td><a href=\"/delete-server?id={id}\">Stop</a></td></tr>",
                url = html::escape(&url),
                port = server.port,
                path = html::escape(&server.path.display().to_string()),
                id = server.id,
            );
        }
        page.push_str("</table>\n");
    }

    page.push_str("</body></html>\n");
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render_lists_servers_with_delete_links() {
        let servers = vec![ServerRecord {
            id: 7,
            port: 8003,
            path: PathBuf::from("/srv/<site>"),
            file: None,
        }];

        let page = render(&servers, true, None);

        assert!(page.contains("href=\"http://localhost:8003/\""));
        assert!(page.contains("href=\"/delete-server?id=7\""));
        assert!(page.contains("/srv/&lt;site&gt;"));
        assert!(page.contains("Live reload is enabled"));
        assert!(!page.contains("Network"));
    }

    #[test]
    fn test_render_lan_links() {
        let servers = vec![ServerRecord {
            id: 1,
            port: 8000,
            path: PathBuf::from("/srv/site"),
            file: None,
        }];

        let page = render(&servers, true, Some(Ipv4Addr::new(192, 168, 1, 20)));

        assert!(page.contains("<th>Network</th>"));
        assert!(page.contains("href=\"http://192.168.1.20:8000/\""));
        assert!(page.contains("href=\"http://localhost:8000/\""));
    }

    #[test]
    fn test_render_empty_and_disabled() {
        let page = render(&[], false, None);

        assert!(page.contains("No servers running."));
        assert!(page.contains("Live reload is disabled"));
        assert!(page.contains(">Enable</a>"));
    }
}
