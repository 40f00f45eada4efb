use crate::ast::Item;

#[derive(Debug, thiserror::Error)]
#[error("ParseError on line '{line}': {msg}")]
pub struct Error {
    msg: String,
    pos: usize,
    line: String,
}

impl Error {
    /// Byte offset into the parsed text where the error occurred.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The full line containing the error.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// Parse the full text of a pipeline file.
pub fn parse(text: &str) -> Result<Vec<Item<'_>>, Error> {
    use combine::EasyParser;
    pipeline::items()
        .easy_parse(text)
        .map(|(items, _remainder)| items)
        .map_err(|e| {
            let pos = e.position.translate_position(text);
            // isolate the line in question:
            let before = &text[0..pos];
            let after = &text[pos..text.len()];
            let prefix: String = before.chars().rev().take_while(|&c| c != '\n').collect();
            let prefix: String = prefix.chars().rev().collect();
            let suffix: String = after.chars().take_while(|&c| c != '\n').collect();
            let line = prefix + &suffix;
            // since converting combine's errors is a lifetime nightmare,
            // we just stringify the error before returning it.
            Error {
                pos,
                line,
                msg: format!("{}", e),
            }
        })
}

pub mod prelude {
    pub use combine::parser::char::{char, string};
    pub use combine::parser::range::recognize;
    pub use combine::*;
}

pub mod util {

    use super::prelude::*;
    use combine::parser::char::{alpha_num, letter, space};

    p! {
        ident_start() -> char, {
            char('_').or(letter())
        }
    }

    p! {
        ident_rest() -> Vec<char>, {
            many(char('_').or(alpha_num()))
        }
    }

    p! {
        ident() -> &'a str, {
            recognize(ident_start().and(ident_rest()))
        }
    }

    // a trailing newline is optional so files can end in a comment.
    p! {
        comment() -> &'a str, {
            recognize(
                char('#')
                .and(skip_many(none_of("\n".chars())))
                .and(optional(char('\n')))
            )
        }
    }

    p! {
        whitespace() -> (), {
            skip_many1(
                space().map(|_| ()).or(comment().map(|_| ()))
            )
        }
    }

    wrapper! {
        lex(parser), {
            optional(whitespace()).with(parser).skip(optional(whitespace()))
        }
    }

    p! {
        line_internal_whitespace() -> (), {
            skip_many1(satisfy(|c: char| c.is_whitespace() && c != '\n'))
        }
    }

    wrapper! {
        lex_inline(parser), {
            optional(line_internal_whitespace())
                .with(parser)
                .skip(optional(line_internal_whitespace()))
        }
    }

    // parser, followed by *mandatory* line-internal whitespace
    wrapper! {
        lex_word_inline(parser), {
            optional(line_internal_whitespace()).with(parser).skip(line_internal_whitespace())
        }
    }

    wrapper! {
        braces(parser), {
            char('{').with(parser).skip(char('}'))
        }
    }

    // end of a line: eof, newline or a trailing comment,
    // plus any blank or comment lines after it.
    p! {
        eol() -> (), {
            eof().or(
                comment().map(|_| ())
                    .or(char('\n').map(|_| ()))
                    .skip(optional(whitespace()))
            )
        }
    }

    wrapper! {
        line(parser), {
            lex_inline(parser).skip(eol())
        }
    }

}

mod literal {

    use super::prelude::*;

    const FORBID_UNQUOTED: [char; 9] = ['(', ')', '[', ']', '{', '}', '#', '"', '\''];

    wrapper! {
        double_quotes(parser), {
            char('"').with(parser).skip(char('"'))
        }
    }

    p! {
        double_quoted_literal() -> &'a str, {
            double_quotes(recognize(skip_many(none_of("\"".chars()))))
        }
    }

    p! {
        unquoted_literal_char() -> char, {
            satisfy(|c: char|
                !c.is_whitespace() && !FORBID_UNQUOTED.iter().any(|&forbidden| forbidden == c)
            )
        }
    }

    p! {
        unquoted_literal() -> &'a str, {
            recognize(skip_many1(unquoted_literal_char()))
        }
    }

    p! {
        literal() -> &'a str, {
            double_quoted_literal().or(unquoted_literal())
        }
    }

}

mod config {
    use super::literal::literal;
    use super::prelude::*;
    use super::util::{braces, ident, lex, lex_inline, line, whitespace};

    p! {
        config_line() -> (&'a str, &'a str), {
            lex_inline(ident())
                .skip(lex_inline(char('=')))
                .and(lex_inline(literal()))
        }
    }

    p! {
        config_block() -> Vec<(&'a str, &'a str)>, {
            lex(string("config")).with(braces(
                optional(whitespace()).with(
                    many(line(config_line()))
                )
            ))
        }
    }

}

mod invocation {
    use super::literal::literal;
    use super::prelude::*;
    use super::util::{braces, ident, lex, lex_inline, lex_word_inline, line, whitespace};
    use crate::ast::{ArgSpec, Binding, InvocationBlock, Stmt};

    /// What follows an argument's marker.
    pub enum Tail<'a> {
        Temp(Option<&'a str>),
        Value(Option<&'a str>),
    }

    p! {
        module_stmt() -> Stmt<'a>, {
            lex_word_inline(string("module"))
                .with(lex_word_inline(ident()))
                .and(lex_inline(literal()))
                .and(optional(attempt(
                    lex_word_inline(string("entry")).with(lex_inline(literal()))
                )))
                .map(|((kind, location), entry)| Stmt::Module { kind, location, entry })
        }
    }

    p! {
        memory_stmt() -> Stmt<'a>, {
            lex_word_inline(string("memory"))
                .with(lex_inline(literal()))
                .map(Stmt::Memory)
        }
    }

    p! {
        flag_stmt() -> Stmt<'a>, {
            lex_word_inline(string("flag"))
                .with(lex_inline(literal()))
                .map(Stmt::Flag)
        }
    }

    // "to_temp" only as a whole word.
    p! {
        to_temp() -> &'a str, {
            string("to_temp").skip(
                look_ahead(satisfy(|c: char| c.is_whitespace()).map(|_| ())).or(eof())
            )
        }
    }

    p! {
        tail() -> Tail<'a>, {
            attempt(lex_inline(to_temp()).with(optional(lex_inline(literal())))).map(Tail::Temp)
                .or(optional(lex_inline(literal())).map(Tail::Value))
        }
    }

    p! {
        binding() -> Binding<'a>, {
            attempt(lex_word_inline(string("fixed")).with(lex_inline(literal())))
                .map(Binding::Fixed)
                .or(
                    lex_inline(ident()).and(tail()).map(|(marker, tail)| match tail {
                        Tail::Temp(prefix) => Binding::ToTemp { marker, prefix },
                        Tail::Value(value) => Binding::Parametric { marker, value },
                    })
                )
        }
    }

    p! {
        arg_stmt() -> Stmt<'a>, {
            lex_word_inline(ident())
                .and(lex_inline(literal()))
                .and(binding())
                .map(|((kind, description), binding)| {
                    Stmt::Arg(ArgSpec { kind, description, binding })
                })
        }
    }

    p! {
        stmt() -> Stmt<'a>, {
            choice!(
                attempt(module_stmt()),
                attempt(memory_stmt()),
                attempt(flag_stmt()),
                arg_stmt()
            )
        }
    }

    p! {
        invocation_block() -> InvocationBlock<'a>, {
            lex_word_inline(string("invocation"))
                .with(lex(ident()))
                .and(braces(
                    optional(whitespace()).with(many(line(stmt())))
                ))
                .map(|(name, stmts)| InvocationBlock { name, stmts })
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;
        use combine::EasyParser;
        #[test]
        fn test_module() {
            assert_eq!(
                Stmt::Module {
                    kind: "packaged",
                    location: "/opt/mods/convert.jar",
                    entry: Some("org.example.Convert"),
                },
                stmt()
                    .easy_parse("module packaged \"/opt/mods/convert.jar\" entry org.example.Convert")
                    .unwrap()
                    .0
            );
            assert_eq!(
                Stmt::Module {
                    kind: "macro",
                    location: "file:///opt/m.ijm",
                    entry: None,
                },
                stmt().easy_parse("module macro file:///opt/m.ijm").unwrap().0
            );
        }
        #[test]
        fn test_memory_and_flag() {
            assert_eq!(Stmt::Memory("1024"), stmt().easy_parse("memory 1024").unwrap().0);
            assert_eq!(
                Stmt::Flag("-Dverbose=1"),
                stmt().easy_parse("flag \"-Dverbose=1\"").unwrap().0
            );
        }
        #[test]
        fn test_args() {
            assert_eq!(
                Stmt::Arg(ArgSpec::parametric("in", "raw data", "csv", Some("/data/raw.csv"))),
                stmt().easy_parse("in \"raw data\" csv \"/data/raw.csv\"").unwrap().0
            );
            assert_eq!(
                Stmt::Arg(ArgSpec::to_temp("out", "table", "csv", Some("conv"))),
                stmt().easy_parse("out table csv to_temp conv").unwrap().0
            );
            assert_eq!(
                Stmt::Arg(ArgSpec::to_temp("out", "table", "xml", None)),
                stmt().easy_parse("out table xml to_temp").unwrap().0
            );
            assert_eq!(
                Stmt::Arg(ArgSpec::fixed("text", "mode", "fast")),
                stmt().easy_parse("text mode fixed fast").unwrap().0
            );
            assert_eq!(
                Stmt::Arg(ArgSpec::parametric("sub", "feed", "any", None)),
                stmt().easy_parse("sub feed any").unwrap().0
            );
            // a literal that merely starts with the keyword:
            assert_eq!(
                Stmt::Arg(ArgSpec::parametric("in", "x", "file", Some("to_temporary"))),
                stmt().easy_parse("in x file to_temporary").unwrap().0
            );
        }
        #[test]
        fn test_block() {
            let text = "invocation convert {\n  \
                module packaged /opt/c.jar entry Main\n  \
                # comment line\n  \
                memory 256\n  \
                out table csv to_temp conv\n\
                }";
            assert_eq!(
                InvocationBlock {
                    name: "convert",
                    stmts: vec![
                        Stmt::Module {
                            kind: "packaged",
                            location: "/opt/c.jar",
                            entry: Some("Main"),
                        },
                        Stmt::Memory("256"),
                        Stmt::Arg(ArgSpec::to_temp("out", "table", "csv", Some("conv"))),
                    ],
                },
                invocation_block().easy_parse(text).unwrap().0
            );
        }
    }
}

mod order {
    use super::prelude::*;
    use super::util::{ident, lex_inline, lex_word_inline, line};

    p! {
        order_stmt() -> (&'a str, Vec<&'a str>), {
            line(
                lex_word_inline(string("order"))
                    .with(lex_word_inline(ident()))
                    .skip(lex_word_inline(string("after")))
                    .and(many1(lex_inline(ident())))
            )
        }
    }

}

mod link {
    use super::prelude::*;
    use super::util::{ident, lex_inline, lex_word_inline, line};
    use crate::ast::SlotRef;
    use combine::parser::char::digit;

    p! {
        slot_ref() -> SlotRef<'a>, {
            ident()
                .skip(char('.'))
                .and(recognize(skip_many1(digit())))
                .map(|(invocation, index)| SlotRef { invocation, index })
        }
    }

    p! {
        link_stmt() -> (SlotRef<'a>, SlotRef<'a>), {
            line(
                lex_word_inline(string("link"))
                    .with(lex_word_inline(slot_ref()))
                    .skip(lex_word_inline(string("to")))
                    .and(lex_inline(slot_ref()))
            )
        }
    }

    #[cfg(test)]
    mod test {
        use crate::ast::SlotRef;
        use combine::EasyParser;
        #[test]
        fn test_link() {
            assert_eq!(
                (
                    SlotRef { invocation: "convert", index: "2" },
                    SlotRef { invocation: "plot", index: "1" },
                ),
                super::link_stmt().easy_parse("link convert.2 to plot.1\n").unwrap().0
            );
            assert!(super::link_stmt().easy_parse("link convert to plot.1\n").is_err());
            assert!(super::link_stmt().easy_parse("link convert.x to plot.1\n").is_err());
        }
    }
}

mod pipeline {
    use super::{
        config::config_block, invocation::invocation_block, link::link_stmt, order::order_stmt,
        prelude::*,
        util::{lex, whitespace},
    };
    use crate::ast::Item;

    // the keywords differ in their first letter,
    // so no alternative consumes input before failing.
    p! {
        item() -> Item<'a>, {
            choice!(
                config_block().map(Item::Config),
                invocation_block().map(Item::Invocation),
                order_stmt().map(|(waiter, predecessors)| Item::Order { waiter, predecessors }),
                link_stmt().map(|(source, destination)| Item::Link { source, destination })
            )
        }
    }

    p! {
        items() -> Vec<Item<'a>>, {
            optional(whitespace())
                .with(many(lex(item())))
                .skip(eof())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{ArgSpec, InvocationBlock, SlotRef, Stmt};

    const PIPELINE: &str = "
# example pipeline
config {
  executable = /usr/bin/java
  run_order_links = true
}

invocation convert {
  module packaged \"/opt/mods/convert.jar\" entry org.example.Convert
  in   \"raw data\" csv \"/data/raw.csv\"
  out  table csv to_temp conv
}

invocation plot
{
  module macro /opt/macros/plot.ijm
  in table csv
}

link convert.2 to plot.1
order plot after convert
";

    #[test]
    fn test_parse_pipeline() {
        let items = parse(PIPELINE).unwrap();
        assert_eq!(5, items.len());
        assert_eq!(
            Item::Config(vec![
                ("executable", "/usr/bin/java"),
                ("run_order_links", "true"),
            ]),
            items[0]
        );
        assert_eq!(
            Item::Invocation(InvocationBlock {
                name: "plot",
                stmts: vec![
                    Stmt::Module {
                        kind: "macro",
                        location: "/opt/macros/plot.ijm",
                        entry: None,
                    },
                    Stmt::Arg(ArgSpec::parametric("in", "table", "csv", None)),
                ],
            }),
            items[2]
        );
        assert_eq!(
            Item::Link {
                source: SlotRef {
                    invocation: "convert",
                    index: "2",
                },
                destination: SlotRef {
                    invocation: "plot",
                    index: "1",
                },
            },
            items[3]
        );
        assert_eq!(
            Item::Order {
                waiter: "plot",
                predecessors: vec!["convert"],
            },
            items[4]
        );
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse("invocation a {\n  module\n}\nbogus").unwrap_err();
        assert!(err.position() > 0);
        assert!(!err.line().is_empty());

        let err = parse("config {}\nbogus thing\n").unwrap_err();
        assert_eq!("bogus thing", err.line());
    }
}
