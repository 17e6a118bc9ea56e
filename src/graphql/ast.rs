//! A small hand-written tokenizer and recursive-descent parser covering
//! the operational subset of GraphQL this crate executes: named or
//! anonymous query/mutation/subscription operations, nested selection
//! sets, aliases, and literal/variable arguments. Fragments and directives
//! are out of scope — every example repo's query surface is flat enough
//! that pulling in a full grammar wasn't worth the added failure surface.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Variable(String),
    List(Vec<ArgValue>),
    Object(BTreeMap<String, ArgValue>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, ArgValue)>,
    pub selection_set: Vec<Field>,
    pub location: Location,
}

impl Field {
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_introspection(&self) -> bool {
        self.name == "__schema" || self.name == "__type" || self.name == "__typename"
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub operation: OperationType,
    pub name: Option<String>,
    pub selection_set: Vec<Field>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("unexpected token {0:?} at line {1} column {2}")]
    UnexpectedToken(String, u32, u32),
    #[error("unterminated string literal")]
    UnterminatedString,
}

struct Lexer<'a> {
    chars: std::str::CharIndices<'a>,
    source: &'a str,
    line: u32,
    column: u32,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices(),
            source,
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.peeked.take().or_else(|| self.chars.next());
        if let Some((_, ch)) = next {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn skip_trivia(&mut self) {
        while let Some((_, ch)) = self.peek() {
            if ch.is_whitespace() || ch == ',' {
                self.bump();
            } else if ch == '#' {
                while let Some((_, c)) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn loc(&mut self) -> Location {
        self.skip_trivia();
        Location {
            line: self.line,
            column: self.column,
        }
    }

    fn next_name(&mut self) -> Option<&'a str> {
        self.skip_trivia();
        let (start, first) = self.peek()?;
        if !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let mut end = start + first.len_utf8();
        self.bump();
        while let Some((idx, c)) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                end = idx + c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        Some(&self.source[start..end])
    }

    fn next_char_if(&mut self, expected: char) -> bool {
        self.skip_trivia();
        if matches!(self.peek(), Some((_, c)) if c == expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.skip_trivia();
        self.peek().map(|(_, c)| c)
    }
}

pub fn parse(source: &str) -> Result<Document, ParseError> {
    let mut lexer = Lexer::new(source);
    lexer.skip_trivia();

    let (operation, name) = parse_operation_header(&mut lexer)?;
    let selection_set = parse_selection_set(&mut lexer)?;
    Ok(Document {
        operation,
        name,
        selection_set,
    })
}

fn parse_operation_header(lexer: &mut Lexer<'_>) -> Result<(OperationType, Option<String>), ParseError> {
    lexer.skip_trivia();
    if lexer.peek_char() == Some('{') {
        return Ok((OperationType::Query, None));
    }
    let keyword = lexer.next_name().ok_or(ParseError::UnexpectedEof)?;
    let operation = match keyword {
        "query" => OperationType::Query,
        "mutation" => OperationType::Mutation,
        "subscription" => OperationType::Subscription,
        other => {
            let loc = lexer.loc();
            return Err(ParseError::UnexpectedToken(other.to_string(), loc.line, loc.column));
        }
    };
    let name = lexer.next_name().map(str::to_string);
    // skip a variable-definitions block if present: (...)
    if lexer.next_char_if('(') {
        let mut depth = 1;
        while depth > 0 {
            match lexer.bump() {
                Some((_, '(')) => depth += 1,
                Some((_, ')')) => depth -= 1,
                Some(_) => {}
                None => return Err(ParseError::UnexpectedEof),
            }
        }
    }
    Ok((operation, name))
}

fn parse_selection_set(lexer: &mut Lexer<'_>) -> Result<Vec<Field>, ParseError> {
    if !lexer.next_char_if('{') {
        let loc = lexer.loc();
        return Err(ParseError::UnexpectedToken("{".to_string(), loc.line, loc.column));
    }
    let mut fields = Vec::new();
    loop {
        lexer.skip_trivia();
        if lexer.next_char_if('}') {
            break;
        }
        fields.push(parse_field(lexer)?);
    }
    Ok(fields)
}

fn parse_field(lexer: &mut Lexer<'_>) -> Result<Field, ParseError> {
    let location = lexer.loc();
    let first = lexer.next_name().ok_or(ParseError::UnexpectedEof)?.to_string();

    let (alias, name) = if lexer.next_char_if(':') {
        let real = lexer.next_name().ok_or(ParseError::UnexpectedEof)?.to_string();
        (Some(first), real)
    } else {
        (None, first)
    };

    let mut arguments = Vec::new();
    if lexer.next_char_if('(') {
        loop {
            lexer.skip_trivia();
            if lexer.next_char_if(')') {
                break;
            }
            let arg_name = lexer.next_name().ok_or(ParseError::UnexpectedEof)?.to_string();
            if !lexer.next_char_if(':') {
                let loc = lexer.loc();
                return Err(ParseError::UnexpectedToken(":".to_string(), loc.line, loc.column));
            }
            let value = parse_value(lexer)?;
            arguments.push((arg_name, value));
        }
    }

    let selection_set = if lexer.peek_char() == Some('{') {
        parse_selection_set(lexer)?
    } else {
        Vec::new()
    };

    Ok(Field {
        alias,
        name,
        arguments,
        selection_set,
        location,
    })
}

fn parse_value(lexer: &mut Lexer<'_>) -> Result<ArgValue, ParseError> {
    lexer.skip_trivia();
    match lexer.peek_char() {
        Some('$') => {
            lexer.bump();
            let name = lexer.next_name().ok_or(ParseError::UnexpectedEof)?.to_string();
            Ok(ArgValue::Variable(name))
        }
        Some('"') => {
            lexer.bump();
            let mut s = String::new();
            loop {
                match lexer.bump() {
                    Some((_, '"')) => break,
                    Some((_, c)) => s.push(c),
                    None => return Err(ParseError::UnterminatedString),
                }
            }
            Ok(ArgValue::String(s))
        }
        Some('[') => {
            lexer.bump();
            let mut items = Vec::new();
            loop {
                lexer.skip_trivia();
                if lexer.next_char_if(']') {
                    break;
                }
                items.push(parse_value(lexer)?);
            }
            Ok(ArgValue::List(items))
        }
        Some('{') => {
            lexer.bump();
            let mut fields = BTreeMap::new();
            loop {
                lexer.skip_trivia();
                if lexer.next_char_if('}') {
                    break;
                }
                let key = lexer.next_name().ok_or(ParseError::UnexpectedEof)?.to_string();
                lexer.next_char_if(':');
                fields.insert(key, parse_value(lexer)?);
            }
            Ok(ArgValue::Object(fields))
        }
        Some(c) if c.is_ascii_digit() || c == '-' => parse_number(lexer),
        Some(_) => {
            let ident = lexer.next_name().ok_or(ParseError::UnexpectedEof)?;
            match ident {
                "true" => Ok(ArgValue::Boolean(true)),
                "false" => Ok(ArgValue::Boolean(false)),
                "null" => Ok(ArgValue::Null),
                other => Ok(ArgValue::String(other.to_string())), // bare enum value
            }
        }
        None => Err(ParseError::UnexpectedEof),
    }
}

fn parse_number(lexer: &mut Lexer<'_>) -> Result<ArgValue, ParseError> {
    let mut raw = String::new();
    if lexer.peek_char() == Some('-') {
        raw.push('-');
        lexer.bump();
    }
    let mut is_float = false;
    while let Some(c) = lexer.peek_char() {
        if c.is_ascii_digit() {
            raw.push(c);
            lexer.bump();
        } else if c == '.' && !is_float {
            is_float = true;
            raw.push(c);
            lexer.bump();
        } else {
            break;
        }
    }
    if is_float {
        raw.parse().map(ArgValue::Float).map_err(|_| ParseError::UnexpectedEof)
    } else {
        raw.parse().map(ArgValue::Int).map_err(|_| ParseError::UnexpectedEof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_anonymous_query_with_nested_selection() {
        let doc = parse("{ user(id: 1) { name friends { name } } }").unwrap();
        assert_eq!(doc.operation, OperationType::Query);
        assert_eq!(doc.selection_set.len(), 1);
        let user = &doc.selection_set[0];
        assert_eq!(user.name, "user");
        assert_eq!(user.arguments, vec![("id".to_string(), ArgValue::Int(1))]);
        assert_eq!(user.selection_set.len(), 2);
        assert_eq!(user.selection_set[1].selection_set[0].name, "name");
    }

    #[test]
    fn parses_named_mutation_with_alias_and_variable_argument() {
        let doc = parse("mutation CreateUser($name: String) { created: createUser(name: $name) { id } }").unwrap();
        assert_eq!(doc.operation, OperationType::Mutation);
        assert_eq!(doc.name.as_deref(), Some("CreateUser"));
        let field = &doc.selection_set[0];
        assert_eq!(field.alias.as_deref(), Some("created"));
        assert_eq!(field.arguments[0].1, ArgValue::Variable("name".to_string()));
    }

    #[test]
    fn rejects_missing_opening_brace() {
        let err = parse("query").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken(..)));
    }
}
