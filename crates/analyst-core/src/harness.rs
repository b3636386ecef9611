//! Trusted wrapper script around untrusted payload code.

use crate::paths::INSIGHTS_FILE;

const INDENT: &str = "    ";

const PRELUDE: &str = r#"import sys as _sys
import os as _os
import time as _time
import json as _json
import traceback as _traceback

_FIGURE_COUNT = [0]

try:
    import matplotlib as _mpl
    _mpl.use("Agg")
    import matplotlib.pyplot as plt

    def _save_figure(*_args, **_kwargs):
        _FIGURE_COUNT[0] += 1
        _name = "figure_%d_%d.png" % (int(_time.time() * 1000), _FIGURE_COUNT[0])
        plt.savefig(_name, bbox_inches="tight")
        plt.close("all")
        print("[figure saved] " + _name)

    plt.show = _save_figure
except ImportError:
    plt = None


def _load_dataset(path):
    _ext = _os.path.splitext(path)[1].lower()
    try:
        import pandas as pd
    except ImportError:
        pd = None
    if pd is not None:
        if _ext == ".tsv":
            return pd.read_csv(path, sep="\t")
        if _ext == ".json":
            with open(path) as _fh:
                _data = _json.load(_fh)
            if isinstance(_data, dict):
                _data = _data.get("records", [])
            return pd.DataFrame(_data)
        return pd.read_csv(path)
    print("WARNING: pandas is not installed; df is a list of row dicts", file=_sys.stderr)
    if _ext == ".json":
        with open(path) as _fh:
            _data = _json.load(_fh)
        return _data.get("records", []) if isinstance(_data, dict) else _data
    import csv as _csv
    with open(path, newline="") as _fh:
        return list(_csv.DictReader(_fh, delimiter="\t" if _ext == ".tsv" else ","))

"#;

/// Build the script executed in a task's working directory.
///
/// The prelude routes `plt.show()` to a time-stamped PNG and loads the
/// dataset into `df`. The payload runs indented inside `try:`; any uncaught
/// exception prints `ERROR: <Type>: <message>` and a traceback to stderr and
/// exits 1. A top-level `insights` dict is written to `_insights.json`.
pub fn assemble_harness(payload: &str, dataset_file: &str) -> String {
    let hoisted = leading_future_imports(payload);
    let mut script = String::with_capacity(PRELUDE.len() + payload.len() * 2 + 1024);
    for &idx in &hoisted {
        if let Some(line) = payload.lines().nth(idx) {
            script.push_str(line.trim());
            script.push('\n');
        }
    }
    script.push_str(PRELUDE);
    script.push_str(&format!("df = _load_dataset({})\n\n", py_string(dataset_file)));

    script.push_str("try:\n");
    for (idx, line) in payload.lines().enumerate() {
        if line.trim().is_empty() {
            script.push('\n');
        } else {
            script.push_str(INDENT);
            // Hoisted lines stay as comments so payload line numbers hold.
            if hoisted.contains(&idx) {
                script.push_str("# ");
            }
            script.push_str(line);
            script.push('\n');
        }
    }
    script.push_str(INDENT);
    script.push_str("pass\n");
    script.push_str(
        r#"    if plt is not None and plt.get_fignums():
        _save_figure()
except SystemExit:
    raise
except Exception as _exc:
    print("ERROR: %s: %s" % (type(_exc).__name__, _exc), file=_sys.stderr)
    _traceback.print_exc()
    _sys.exit(1)

"#,
    );
    script.push_str(&format!(
        r#"_insights = globals().get("insights")
if isinstance(_insights, dict):
    try:
        with open({file}, "w") as _fh:
            _json.dump(_insights, _fh, default=str)
    except (TypeError, ValueError) as _exc:
        print("WARNING: insights not serialisable: %s" % _exc, file=_sys.stderr)
"#,
        file = py_string(INSIGHTS_FILE)
    ));
    script
}

/// Line indexes of the `from __future__ import ...` statements at the top of
/// `payload`. Python only accepts them at the start of the file, so they
/// cannot run inside the guarded block. Blank and comment lines may precede
/// them; a parenthesised import spread over lines ends the scan.
fn leading_future_imports(payload: &str) -> Vec<usize> {
    let mut found = Vec::new();
    for (idx, line) in payload.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let single_line = !trimmed.contains('(') || trimmed.contains(')');
        if trimmed.starts_with("from __future__ import") && single_line {
            found.push(idx);
        } else {
            break;
        }
    }
    found
}

/// Python string literal for `s`. JSON string syntax is a subset of Python's.
fn py_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
