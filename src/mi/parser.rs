//! MI output record parser.
use super::cstring;
use super::output::{
    AsyncKind, AsyncRecord, ExecClass, Record, ResultClass, ResultRecord, StreamKind,
    StreamRecord, Token, Value,
};
use super::ParseError;
use chumsky::prelude::*;

pub(super) type Extra<'a> = extra::Err<Rich<'a, char>>;

const PROMPT: &str = "(gdb)";

pub(super) fn identifier<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .repeated()
        .at_least(1)
        .to_slice()
        .labelled("identifier")
}

pub(super) fn token<'a>() -> impl Parser<'a, &'a str, Option<Token>, Extra<'a>> + Clone {
    text::int(10)
        .try_map(|s: &str, span| {
            s.parse::<u32>()
                .map(Token)
                .map_err(|e| Rich::custom(span, e))
        })
        .labelled("token")
        .or_not()
}

/// C-string literal, the result is unescaped.
pub(super) fn c_string<'a>() -> impl Parser<'a, &'a str, String, Extra<'a>> + Clone {
    let plain = any().filter(|c: &char| *c != '"' && *c != '\\').ignored();
    let escaped = just('\\').then(any()).ignored();

    plain
        .or(escaped)
        .repeated()
        .to_slice()
        .delimited_by(just('"'), just('"'))
        .try_map(|raw: &str, span| cstring::unescape(raw).map_err(|e| Rich::custom(span, e)))
        .labelled("c-string")
}

fn value<'a>() -> impl Parser<'a, &'a str, Value, Extra<'a>> + Clone {
    recursive(|value| {
        let result = identifier()
            .map(ToString::to_string)
            .then_ignore(just('='))
            .then(value.clone());

        let tuple = result
            .clone()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('{'), just('}'))
            .map(Value::Tuple)
            .labelled("tuple");

        // some backends put bare values into braces
        let value_tuple = value
            .clone()
            .separated_by(just(','))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just('{'), just('}'))
            .map(Value::List);

        let result_list = result
            .separated_by(just(','))
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just('['), just(']'))
            .map(Value::ResultList);

        let value_list = value
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('['), just(']'))
            .map(Value::List)
            .labelled("list");

        choice((
            c_string().map(Value::Const),
            tuple,
            value_tuple,
            result_list,
            value_list,
        ))
    })
}

fn results<'a>() -> impl Parser<'a, &'a str, Vec<(String, Value)>, Extra<'a>> + Clone {
    let result = identifier()
        .map(ToString::to_string)
        .then_ignore(just('='))
        .then(value());

    just(',')
        .ignore_then(result)
        .repeated()
        .collect::<Vec<_>>()
}

fn record<'a>() -> impl Parser<'a, &'a str, Record, Extra<'a>> {
    let result_record = token()
        .then_ignore(just('^'))
        .then(identifier().try_map(|class: &str, span| {
            class
                .parse::<ResultClass>()
                .map_err(|_| Rich::custom(span, format!("unknown result class `{class}`")))
        }))
        .then(results())
        .map(|((token, class), results)| {
            Record::Result(ResultRecord {
                token,
                class,
                results,
            })
        })
        .labelled("result record");

    let async_kind = choice((
        just('*').to(AsyncKind::Exec),
        just('+').to(AsyncKind::Status),
        just('=').to(AsyncKind::Notify),
    ));
    let async_record = token()
        .then(async_kind)
        .then(identifier())
        .then(results())
        .try_map(|(((token, kind), class), results), span| {
            if kind == AsyncKind::Exec && class.parse::<ExecClass>().is_err() {
                return Err(Rich::custom(span, format!("unknown exec class `{class}`")));
            }
            Ok(Record::Async(AsyncRecord {
                token,
                kind,
                class: class.to_string(),
                results,
            }))
        })
        .labelled("async record");

    let stream_kind = choice((
        just('~').to(StreamKind::Console),
        just('@').to(StreamKind::Target),
        just('&').to(StreamKind::Log),
    ));
    let stream_record = stream_kind
        .then(c_string())
        .map(|(kind, text)| Record::Stream(StreamRecord { kind, text }))
        .labelled("stream record");

    choice((stream_record, result_record, async_record)).then_ignore(end())
}

/// Parse one line of backend output.
pub fn try_parse(line: &str) -> Result<Record, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim_end() == PROMPT {
        return Ok(Record::Prompt);
    }

    record()
        .parse(line)
        .into_result()
        .map_err(|errs| match errs.first() {
            Some(e) => ParseError::Syntax(e.to_string()),
            None => ParseError::Syntax("unknown syntax error".to_string()),
        })
}

/// Parse one line of backend output. Malformed line produces [`Record::ParseFailure`].
pub fn parse(line: &str) -> Record {
    match try_parse(line) {
        Ok(record) => record,
        Err(e) => Record::ParseFailure {
            line: line.trim_end_matches(['\r', '\n']).to_string(),
            reason: e.to_string(),
        },
    }
}
