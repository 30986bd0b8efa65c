//! Minimal GPX 1.1 writer.

use std::fmt::Write;

use crate::types::LonLat;

/// Render a track through `points` as a GPX 1.1 document.
#[must_use]
pub fn write_track(name: &str, points: &[LonLat]) -> String {
    let mut out = String::with_capacity(256 + points.len() * 48);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(
        "<gpx version=\"1.1\" creator=\"greenspace\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n",
    );
    out.push_str("  <trk>\n");
    let _ = writeln!(out, "    <name>{}</name>", escape(name));
    out.push_str("    <trkseg>\n");
    for [lon, lat] in points {
        let _ = writeln!(out, "      <trkpt lat=\"{lat:.6}\" lon=\"{lon:.6}\"/>");
    }
    out.push_str("    </trkseg>\n");
    out.push_str("  </trk>\n");
    out.push_str("</gpx>\n");
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
