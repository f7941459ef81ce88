use prelude::flame;
use std::fs::File;
use std::io;
use std::path::Path;

/// Writes the spans recorded on this thread as an HTML flame graph.
pub fn write_flame(path: &Path) -> io::Result<()> {
    flame::dump_html(File::create(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn writes_recorded_spans() {
        {
            let _guard = flame::start_guard("control cycle");
        }
        let path = env::temp_dir().join(format!("flame-graph-{}.html", std::process::id()));
        write_flame(&path).unwrap();

        let html = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(html.contains(r#"name: "control cycle""#));
    }
}
