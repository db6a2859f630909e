use super::*;

fn words(command: &ParsedCommand) -> &[Word] {
    &command.words
}

#[test]
fn test_commands_split_on_newlines_and_semicolons() {
    let commands = parse_script("set a 1; set b 2\n\n# comment\nset c 3").unwrap();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].text, "set a 1");
    assert_eq!(commands[2].line, 4);
}

#[test]
fn test_braced_words_are_literal() {
    let commands = parse_script("set x {a $b [c] {nested}}").unwrap();
    assert_eq!(
        words(&commands[0])[2],
        Word::Literal("a $b [c] {nested}".to_string())
    );
}

#[test]
fn test_quoted_word_parts() {
    let commands = parse_script("set x \"v=$y [list 1]\\n\"").unwrap();
    let Word::Parts(parts) = &words(&commands[0])[2] else {
        unreachable!()
    };
    assert_eq!(
        parts,
        &vec![
            Part::Text("v=".to_string()),
            Part::Var("y".to_string()),
            Part::Text(" ".to_string()),
            Part::Command("list 1".to_string()),
            Part::Text("\n".to_string()),
        ]
    );
}

#[test]
fn test_qualified_and_braced_variable_names() {
    let commands = parse_script("set x $::a::b${odd name}").unwrap();
    let Word::Parts(parts) = &words(&commands[0])[2] else {
        unreachable!()
    };
    assert_eq!(parts[0], Part::Var("::a::b".to_string()));
    assert_eq!(parts[1], Part::Var("odd name".to_string()));
}

#[test]
fn test_unterminated_command_substitution_is_a_syntax_error() {
    let err = EngineError::from(parse_script("set x [oops").unwrap_err());
    assert!(err.to_string().starts_with("syntax error"));
}

#[test]
fn test_parse_list_elements() {
    assert_eq!(
        parse_list("a {b c} \"d e\" {}").unwrap(),
        vec!["a", "b c", "d e", ""]
    );
    assert!(parse_list("").unwrap().is_empty());
}

#[test]
fn test_format_list_quotes_when_needed() {
    let items = ["plain", "two words", "", "{unbalanced"];
    let formatted = format_list(&items);
    assert_eq!(parse_list(&formatted).unwrap(), items);
    assert!(formatted.starts_with("plain {two words} {}"));
}

#[test]
fn test_evaluator_substitutes_and_invokes() {
    let interp = Interpreter::new();
    interp.eval_top("set a 2; set b \"<$a>\"; set c [set b]").unwrap();
    assert_eq!(interp.get_var("c").unwrap(), "<2>");
}

#[test]
fn test_evaluator_polls_cancellation() {
    let interp = Interpreter::builder()
        .global_signals(std::sync::Arc::new(crate::cancel::SignalFlags::new()))
        .build();
    interp.request_cancel(crate::cancel::CancelScope::Local);

    let result = interp.eval("set a 1");
    assert_eq!(result, Err(Control::Error(EngineError::Cancelled)));
    assert!(!interp.var_exists("a"));
}
