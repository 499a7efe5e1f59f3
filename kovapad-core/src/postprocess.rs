//! Textual post-processing of toolchain-generated JavaScript.
//!
//! Both transforms are coupled to one specific, versioned shape of the
//! generated module wrapper. Argument injection is a no-op when the tail it
//! expects is absent, returning the input byte for byte. The output-capture
//! splice instead validates its anchor line and refuses to patch code whose
//! shape has drifted, since patching blindly would corrupt the program.

use crate::error::PipelineError;

/// Lines counted back from the end of generated JS to the entry-point call.
const BEFORE_MAIN_CALL_LINE: usize = 4;

/// Output-capture block spliced directly ahead of the entry-point call.
const OUTPUT_REWRITE: &str = "if (typeof get_output !== \"undefined\") {
  get_output();
  output = new BufferedOutput();
  _.output = get_output();
}";

fn main_call_postfix(module_name: &str) -> String {
    format!(
        "  main([]);\n  return _;\n}}(typeof {module_name} === 'undefined' ? {{}} : {module_name});\n"
    )
}

/// Replace the empty-argument entry-point call at the end of `code` with one
/// passing `arguments`, each re-encoded as a JSON string literal so quoting
/// and escapes survive verbatim. Code without the recognized tail is
/// returned unchanged.
pub fn inject_main_arguments(code: &str, arguments: &[String], module_name: &str) -> String {
    let postfix = main_call_postfix(module_name);
    if !code.ends_with(&postfix) {
        return code.to_string();
    }
    let encoded = arguments
        .iter()
        .map(|argument| serde_json::Value::String(argument.clone()).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let patched = format!(
        "  main([{encoded}]);\n  return _;\n}}(typeof {module_name} === 'undefined' ? {{}} : {module_name});\n"
    );
    format!("{}{patched}", &code[..code.len() - postfix.len()])
}

/// Splice the output-capture block into generated JS.
///
/// The block lands [`BEFORE_MAIN_CALL_LINE`] lines from the end, immediately
/// ahead of the entry-point call, and a final line capturing the module's
/// output buffer is appended after the wrapper closes. The line at the
/// computed offset must actually be the entry-point call; anything else
/// means the generator's shape changed.
pub fn redirect_output(code: &str, module_name: &str) -> Result<String, PipelineError> {
    let mut lines: Vec<String> = code.split('\n').map(str::to_string).collect();
    let index = match lines.len().checked_sub(BEFORE_MAIN_CALL_LINE) {
        Some(index) => index,
        None => {
            return Err(PipelineError::UnexpectedCodeShape(format!(
                "generated code has {} lines, expected at least {BEFORE_MAIN_CALL_LINE}",
                lines.len()
            )));
        }
    };
    let anchor = lines[index].trim_start();
    if !anchor.starts_with("main(") {
        return Err(PipelineError::UnexpectedCodeShape(format!(
            "expected the entry-point call {BEFORE_MAIN_CALL_LINE} lines from the end, found {anchor:?}"
        )));
    }
    lines.insert(index, OUTPUT_REWRITE.to_string());
    let last = lines.len() - 1;
    lines.insert(last, format!("{module_name}.output?.buffer;"));
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = "playground";

    fn generated_js() -> String {
        [
            "(function (playground) {",
            "  'use strict';",
            "  function main(args) {",
            "  }",
            "  main([]);",
            "  return _;",
            "}(typeof playground === 'undefined' ? {} : playground);",
            "",
        ]
        .join("\n")
    }

    #[test]
    fn injects_json_escaped_arguments() {
        let arguments = vec!["a\"b".to_string(), "c".to_string()];
        let patched = inject_main_arguments(&generated_js(), &arguments, MODULE);
        assert!(patched.contains("  main([\"a\\\"b\", \"c\"]);\n"));

        // The injected literals decode back to the original values.
        let call_start = patched.find("main([").expect("injected call") + "main([".len();
        let call_end = patched[call_start..].find("])").expect("call end") + call_start;
        let decoded: Vec<String> =
            serde_json::from_str(&format!("[{}]", &patched[call_start..call_end]))
                .expect("valid JSON literals");
        assert_eq!(decoded, arguments);
    }

    #[test]
    fn empty_argument_lists_leave_the_call_empty() {
        let patched = inject_main_arguments(&generated_js(), &[], MODULE);
        assert_eq!(patched, generated_js());
    }

    #[test]
    fn unrecognized_tails_are_returned_unchanged() {
        let code = "console.log('not a module wrapper');\n";
        let arguments = vec!["x".to_string()];
        assert_eq!(inject_main_arguments(code, &arguments, MODULE), code);
    }

    #[test]
    fn splices_capture_block_before_the_entry_point_call() {
        let original = generated_js();
        let original_lines = original.split('\n').count();
        let patched = redirect_output(&original, MODULE).expect("recognized shape");
        let lines: Vec<&str> = patched.split('\n').collect();

        assert_eq!(
            lines[original_lines - BEFORE_MAIN_CALL_LINE],
            "if (typeof get_output !== \"undefined\") {"
        );
        assert_eq!(lines[lines.len() - 2], "playground.output?.buffer;");
        assert_eq!(lines[lines.len() - 1], "");
        assert!(patched.contains("  main([]);"));
    }

    #[test]
    fn splice_composes_with_argument_injection() {
        let injected =
            inject_main_arguments(&generated_js(), &["hello".to_string()], MODULE);
        let patched = redirect_output(&injected, MODULE).expect("recognized shape");
        let lines: Vec<&str> = patched.split('\n').collect();
        let call = lines
            .iter()
            .position(|line| line.trim_start().starts_with("main(["))
            .expect("entry-point call");
        assert_eq!(lines[call - 1], "}");
        assert_eq!(lines[call], "  main([\"hello\"]);");
    }

    #[test]
    fn rejects_code_whose_anchor_drifted() {
        let code = [
            "line one",
            "line two",
            "line three",
            "line four",
            "line five",
            "",
        ]
        .join("\n");
        let result = redirect_output(&code, MODULE);
        assert!(matches!(
            result,
            Err(PipelineError::UnexpectedCodeShape(message)) if message.contains("entry-point")
        ));
    }

    #[test]
    fn rejects_code_shorter_than_the_offset() {
        let result = redirect_output("main([]);", MODULE);
        assert!(matches!(
            result,
            Err(PipelineError::UnexpectedCodeShape(_))
        ));
    }
}
