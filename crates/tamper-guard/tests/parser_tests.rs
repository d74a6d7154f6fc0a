use tamper_guard::{parse_module_paths, parse_tracer_pid};

#[test]
fn tracer_pid_extracts_numeric_value() {
    let status = "Name:\tapp\nState:\tR (running)\nTracerPid:\t42\nUid:\t0\n";
    assert_eq!(parse_tracer_pid(status), Some(42));
}

#[test]
fn tracer_pid_zero_parses_as_zero() {
    assert_eq!(parse_tracer_pid("TracerPid:\t0\n"), Some(0));
}

#[test]
fn missing_tracer_line_yields_none() {
    assert_eq!(parse_tracer_pid("Name:\tapp\nUid:\t0\n"), None);
}

#[test]
fn garbage_tracer_value_yields_none() {
    assert_eq!(parse_tracer_pid("TracerPid:\tnot-a-pid\n"), None);
}

#[test]
fn module_paths_are_extracted_and_deduplicated() {
    let maps = "\
7f60c000-7f60d000 r--p 00000000 08:01 131  /usr/lib/libc.so.6
7f60d000-7f60e000 r-xp 00001000 08:01 131  /usr/lib/libc.so.6
7f60e000-7f60f000 rw-p 00000000 00:00 0
7f610000-7f611000 r-xp 00000000 08:01 245  /usr/lib/libm.so.6
7f612000-7f613000 rw-p 00000000 00:00 0    [heap]
";
    assert_eq!(
        parse_module_paths(maps),
        vec![
            "/usr/lib/libc.so.6".to_string(),
            "/usr/lib/libm.so.6".to_string(),
        ]
    );
}

#[test]
fn anonymous_and_special_mappings_are_skipped() {
    let maps = "\
7f612000-7f613000 rw-p 00000000 00:00 0    [heap]
7f614000-7f615000 rw-p 00000000 00:00 0    [stack]
7f616000-7f617000 rw-p 00000000 00:00 0
";
    assert!(parse_module_paths(maps).is_empty());
}

#[test]
fn empty_input_yields_no_modules() {
    assert!(parse_module_paths("").is_empty());
}
