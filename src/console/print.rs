use crate::mi::{AsyncKind, AsyncRecord, Value};
use itertools::Itertools;
use rustyline::history::History;
use rustyline::{Editor, ExternalPrinter as RLExternalPrinter, Helper};
use std::cell::RefCell;
use std::fmt::Display;

/// [`ExternalPrinter`] prints messages to stdout without breaking an active prompt.
pub struct ExternalPrinter {
    printer: RefCell<Box<dyn RLExternalPrinter>>,
}

// used by a single thread at a time: either the prompt thread or the session thread
unsafe impl Send for ExternalPrinter {}

impl ExternalPrinter {
    pub fn new<H: Helper, I: History>(editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        let external_p = editor.create_external_printer()?;
        Ok(Self {
            printer: RefCell::new(Box::new(external_p)),
        })
    }

    pub fn print(&self, msg: impl Display) {
        let msg = msg.to_string();
        if self.printer.borrow_mut().print(msg.clone()).is_err() {
            print!("{msg}")
        }
    }

    pub fn println(&self, msg: impl Display) {
        let msg = format!("{msg}\n");
        self.print(msg)
    }
}

/// Render results as `name=value` pairs, one per line.
pub fn render_results(results: &[(String, Value)]) -> String {
    results
        .iter()
        .map(|(name, value)| format!("{} = {value}", style::KeywordView::from(name)))
        .join("\n")
}

/// Render async record in a single line, like `*stopped reason="breakpoint-hit", thread-id="1"`.
pub fn render_async(record: &AsyncRecord) -> String {
    let marker = match record.kind {
        AsyncKind::Exec => '*',
        AsyncKind::Status => '+',
        AsyncKind::Notify => '=',
    };
    let results = record
        .results
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .join(", ");
    format!(
        "{} {results}",
        style::EventView::from(format!("{marker}{}", record.class))
    )
}

pub mod style {
    use crossterm::style::{Color, Stylize};
    use std::fmt::{Display, Formatter};

    struct View<T: Display> {
        inner: T,
        color: Color,
    }

    impl<T: Display> Display for View<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_fmt(format_args!("{}", self.inner.to_string().with(self.color)))
        }
    }

    /// Construct structure declaration to display data of the same type (keywords, errors, etc.).
    macro_rules! view_struct {
        ($name: ident, $color: expr) => {
            pub struct $name<T: Display>(View<T>);

            impl<T: Display> From<T> for $name<T> {
                fn from(value: T) -> Self {
                    Self(View {
                        inner: value,
                        color: $color,
                    })
                }
            }

            impl<T: Display> Display for $name<T> {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    self.0.fmt(f)
                }
            }
        };
    }

    view_struct!(KeywordView, Color::Magenta);
    view_struct!(EventView, Color::Yellow);
    view_struct!(ContextView, Color::Green);
    view_struct!(TargetOutputView, Color::Grey);
    view_struct!(ErrorView, Color::Red);
}
