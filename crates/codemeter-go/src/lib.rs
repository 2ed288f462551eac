use std::collections::HashMap;

use anyhow::{Context, Result};
use tree_sitter::{Language as TsLanguage, Node, Parser, Query, QueryCursor, StreamingIterator};

use codemeter_core::analyzer::{
    extract_documentation, Analyzer, Class, ClassKind, Comment, Function, Import, Parameter,
    ParseError, ParsedResult, Property,
};
use codemeter_core::language::Language;

/// Go language analyzer using tree-sitter.
pub struct GoAnalyzer {
    language: TsLanguage,
    import_query: Query,
}

impl GoAnalyzer {
    pub fn new() -> Result<Self> {
        let language: TsLanguage = tree_sitter_go::LANGUAGE.into();

        let import_query = Query::new(
            &language,
            r#"
            (import_spec
              name: (_)? @alias
              path: (_) @path)
            "#,
        )
        .context("failed to compile import query")?;

        Ok(Self {
            language,
            import_query,
        })
    }
}

impl Analyzer for GoAnalyzer {
    fn language(&self) -> Language {
        Language::Go
    }

    fn analyze(&self, content: &[u8]) -> Result<ParsedResult> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("failed to set Go language")?;

        let Some(tree) = parser.parse(content, None) else {
            return Ok(ParsedResult::with_error(
                Language::Go,
                ParseError {
                    message: "failed to parse Go source".to_string(),
                    line: 0,
                    column: 0,
                },
            ));
        };

        let root = tree.root_node();
        if root.has_error() {
            return Ok(ParsedResult::with_error(
                Language::Go,
                syntax_error(root, content),
            ));
        }

        let mut result = ParsedResult::new(Language::Go);
        result.comments = extract_comments(root, content);
        result.imports = self.extract_imports(root, content);

        // Methods may precede their receiver type, so link them after all
        // types are known.
        let mut methods: Vec<(String, Function)> = Vec::new();

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match node.kind() {
                "function_declaration" => {
                    result
                        .functions
                        .push(extract_function(node, content, &result.comments));
                }
                "method_declaration" => {
                    let receiver = node
                        .child_by_field_name("receiver")
                        .and_then(|r| receiver_type(r, content));
                    if let Some(receiver) = receiver {
                        methods.push((receiver, extract_function(node, content, &result.comments)));
                    }
                }
                "type_declaration" => {
                    extract_types(node, content, &result.comments, &mut result.classes);
                }
                _ => {}
            }
        }

        link_methods(&mut result.classes, methods);
        Ok(result)
    }
}

impl GoAnalyzer {
    fn extract_imports(&self, root: Node, content: &[u8]) -> Vec<Import> {
        let query = &self.import_query;
        let alias_idx = query.capture_names().iter().position(|n| *n == "alias");
        let path_idx = query
            .capture_names()
            .iter()
            .position(|n| *n == "path")
            .unwrap_or(0);

        let mut imports = Vec::new();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, root, content);

        while let Some(m) = matches.next() {
            let mut alias = None;
            let mut path = None;

            for capture in m.captures {
                let idx = capture.index as usize;
                if Some(idx) == alias_idx {
                    alias = Some(node_text(capture.node, content));
                } else if idx == path_idx {
                    path = Some(capture.node);
                }
            }

            if let Some(node) = path {
                imports.push(Import {
                    path: node_text(node, content)
                        .trim_matches(|c| c == '"' || c == '`')
                        .to_string(),
                    alias,
                    line: node.start_position().row + 1,
                });
            }
        }

        imports
    }
}

/// Locate the first ERROR or MISSING node in document order.
fn syntax_error(root: Node, content: &[u8]) -> ParseError {
    let mut first = None;
    walk(root, &mut |node| {
        if first.is_none() && (node.is_error() || node.is_missing()) {
            first = Some(node);
        }
    });

    match first {
        Some(node) => {
            let pos = node.start_position();
            let message = if node.is_missing() {
                format!("syntax error: missing {}", node.kind())
            } else {
                let text = node_text(node, content);
                let token = text.split_whitespace().next().unwrap_or("end of file");
                format!("syntax error: unexpected {token}")
            };
            ParseError {
                message,
                line: pos.row + 1,
                column: pos.column + 1,
            }
        }
        None => ParseError {
            message: "syntax error".to_string(),
            line: 0,
            column: 0,
        },
    }
}

struct CommentGroup {
    lines: Vec<String>,
    start_line: usize,
    end_line: usize,
    block: bool,
    last_id: usize,
}

impl CommentGroup {
    fn into_comment(self) -> Comment {
        Comment {
            is_block: self.block || self.lines.len() > 1,
            text: self.lines.join("\n"),
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }
}

/// Collect comments, merging consecutive `//` lines into one group.
fn extract_comments(root: Node, content: &[u8]) -> Vec<Comment> {
    let mut comments = Vec::new();
    let mut current: Option<CommentGroup> = None;

    walk(root, &mut |node| {
        if node.kind() != "comment" {
            return;
        }

        let raw = node_text(node, content);
        let block = raw.starts_with("/*");
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;

        if let Some(group) = current.as_mut() {
            let adjacent = !group.block
                && !block
                && start_line == group.end_line + 1
                && node.prev_sibling().map(|p| p.id()) == Some(group.last_id);
            if adjacent {
                group.lines.push(strip_comment_markers(&raw));
                group.end_line = end_line;
                group.last_id = node.id();
                return;
            }
        }

        if let Some(done) = current.take() {
            comments.push(done.into_comment());
        }
        current = Some(CommentGroup {
            lines: vec![strip_comment_markers(&raw)],
            start_line,
            end_line,
            block,
            last_id: node.id(),
        });
    });

    if let Some(done) = current {
        comments.push(done.into_comment());
    }
    comments
}

fn strip_comment_markers(raw: &str) -> String {
    if let Some(body) = raw.strip_prefix("/*") {
        body.strip_suffix("*/").unwrap_or(body).trim().to_string()
    } else {
        let body = raw.strip_prefix("//").unwrap_or(raw);
        body.strip_prefix(' ').unwrap_or(body).trim_end().to_string()
    }
}

fn extract_function(node: Node, content: &[u8], comments: &[Comment]) -> Function {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, content))
        .unwrap_or_default();
    let start_line = node.start_position().row + 1;

    let parameters = node
        .child_by_field_name("parameters")
        .map(|p| extract_parameters(p, content))
        .unwrap_or_default();
    let return_type = node
        .child_by_field_name("result")
        .map(|r| result_type(r, content))
        .unwrap_or_default();

    Function {
        is_public: is_exported(&name),
        is_test: name.starts_with("Test") || name.starts_with("Benchmark"),
        start_line,
        end_line: node.end_position().row + 1,
        parameters,
        return_type,
        complexity: cyclomatic_complexity(node),
        documentation: extract_documentation(comments, start_line),
        name,
    }
}

/// Parameters in declaration order. `a, b int` yields two entries and
/// unnamed parameters get an empty name.
fn extract_parameters(list: Node, content: &[u8]) -> Vec<Parameter> {
    let mut params = Vec::new();
    let mut cursor = list.walk();

    for decl in list.named_children(&mut cursor) {
        let type_name = match decl.kind() {
            "parameter_declaration" => decl
                .child_by_field_name("type")
                .map(|t| node_text(t, content))
                .unwrap_or_default(),
            "variadic_parameter_declaration" => {
                let inner = decl
                    .child_by_field_name("type")
                    .map(|t| node_text(t, content))
                    .unwrap_or_default();
                format!("...{inner}")
            }
            _ => continue,
        };

        let mut name_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| node_text(n, content))
            .collect();

        if names.is_empty() {
            params.push(Parameter {
                name: String::new(),
                type_name,
            });
        } else {
            params.extend(names.into_iter().map(|name| Parameter {
                name,
                type_name: type_name.clone(),
            }));
        }
    }

    params
}

/// `(int, error)` becomes `int, error`; a single result type is kept as written.
fn result_type(node: Node, content: &[u8]) -> String {
    if node.kind() != "parameter_list" {
        return node_text(node, content);
    }
    extract_parameters(node, content)
        .into_iter()
        .map(|p| p.type_name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Base type name of a method receiver: `(s *Stack[T])` gives `Stack`.
fn receiver_type(receiver: Node, content: &[u8]) -> Option<String> {
    let mut cursor = receiver.walk();
    let decl = receiver
        .named_children(&mut cursor)
        .find(|n| n.kind() == "parameter_declaration")?;
    base_type_name(decl.child_by_field_name("type")?, content)
}

fn base_type_name(node: Node, content: &[u8]) -> Option<String> {
    match node.kind() {
        "type_identifier" => Some(node_text(node, content)),
        "generic_type" => base_type_name(node.child_by_field_name("type")?, content),
        "pointer_type" | "parenthesized_type" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next()?;
            base_type_name(inner, content)
        }
        _ => None,
    }
}

fn extract_types(decl: Node, content: &[u8], comments: &[Comment], classes: &mut Vec<Class>) {
    let decl_line = decl.start_position().row + 1;
    let mut cursor = decl.walk();

    for spec in decl.named_children(&mut cursor) {
        if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
            continue;
        }
        let Some(name_node) = spec.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, content);
        let type_node = spec.child_by_field_name("type");

        let kind = match (spec.kind(), type_node.map(|t| t.kind())) {
            ("type_spec", Some("struct_type")) => ClassKind::Struct,
            ("type_spec", Some("interface_type")) => ClassKind::Interface,
            _ => ClassKind::Alias,
        };

        let properties = match (kind, type_node) {
            (ClassKind::Struct, Some(t)) => extract_fields(t, content),
            _ => Vec::new(),
        };

        // `type X struct` documents from the keyword line, grouped specs from their own line
        let start_line = spec.start_position().row + 1;
        let mut documentation = extract_documentation(comments, start_line);
        if documentation.is_empty() && start_line != decl_line {
            documentation = extract_documentation(comments, decl_line);
        }

        classes.push(Class {
            is_public: is_exported(&name),
            name,
            kind,
            start_line,
            end_line: spec.end_position().row + 1,
            methods: Vec::new(),
            properties,
            documentation,
        });
    }
}

fn extract_fields(struct_type: Node, content: &[u8]) -> Vec<Property> {
    let mut fields = Vec::new();
    let mut cursor = struct_type.walk();
    let Some(list) = struct_type
        .named_children(&mut cursor)
        .find(|n| n.kind() == "field_declaration_list")
    else {
        return fields;
    };

    let mut list_cursor = list.walk();
    for decl in list.named_children(&mut list_cursor) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let type_name = decl
            .child_by_field_name("type")
            .map(|t| node_text(t, content))
            .unwrap_or_default();

        let mut name_cursor = decl.walk();
        let names: Vec<String> = decl
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| node_text(n, content))
            .collect();

        if names.is_empty() {
            // Embedded field
            let embedded = type_name.rsplit('.').next().unwrap_or(&type_name);
            fields.push(Property {
                is_public: is_exported(embedded),
                name: type_name.clone(),
                type_name,
            });
        } else {
            fields.extend(names.into_iter().map(|name| Property {
                is_public: is_exported(&name),
                name,
                type_name: type_name.clone(),
            }));
        }
    }

    fields
}

/// Attach methods to the type named by their receiver. Methods on types
/// declared in another file are dropped.
fn link_methods(classes: &mut [Class], methods: Vec<(String, Function)>) {
    let index: HashMap<String, usize> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.clone(), i))
        .collect();

    for (receiver, method) in methods {
        if let Some(&i) = index.get(&receiver) {
            classes[i].methods.push(method);
        }
    }
}

/// 1 + one per branch point in the function's subtree.
fn cyclomatic_complexity(func: Node) -> u32 {
    let mut complexity = 1;
    walk(func, &mut |node| {
        let counts = match node.kind() {
            "if_statement"
            | "for_statement"
            | "expression_switch_statement"
            | "type_switch_statement"
            | "expression_case"
            | "type_case" => true,
            // `default` of a select is not a switch clause
            "default_case" => node
                .parent()
                .is_some_and(|p| p.kind() != "select_statement"),
            _ => false,
        };
        if counts {
            complexity += 1;
        }
    });
    complexity
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Visit `node` and every descendant in document order.
fn walk<'tree>(node: Node<'tree>, visit: &mut impl FnMut(Node<'tree>)) {
    let mut cursor = node.walk();
    'outer: loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                break 'outer;
            }
        }
    }
}

/// Extract text from a tree-sitter node.
fn node_text(node: Node, source: &[u8]) -> String {
    String::from_utf8_lossy(&source[node.byte_range()]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(code: &str) -> ParsedResult {
        GoAnalyzer::new().unwrap().analyze(code.as_bytes()).unwrap()
    }

    fn function<'a>(result: &'a ParsedResult, name: &str) -> &'a Function {
        result
            .all_functions()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("function {name} not found"))
    }

    #[test]
    fn test_simple_function() {
        let result = analyze(
            r#"package main

import "fmt"

// Hello prints a greeting
func Hello(name string) {
	fmt.Printf("Hello, %s!\n", name)
}"#,
        );

        assert_eq!(result.language, Language::Go);
        assert!(result.errors.is_empty());
        assert_eq!(result.functions.len(), 1);
        assert_eq!(result.imports.len(), 1);
        assert_eq!(result.imports[0].path, "fmt");

        let hello = &result.functions[0];
        assert_eq!(hello.name, "Hello");
        assert_eq!(hello.start_line, 6);
        assert_eq!(hello.end_line, 8);
        assert!(hello.is_public);
        assert!(!hello.is_test);
        assert_eq!(hello.documentation, "Hello prints a greeting");
        assert_eq!(hello.parameters.len(), 1);
        assert_eq!(hello.parameters[0].name, "name");
        assert_eq!(hello.parameters[0].type_name, "string");
    }

    #[test]
    fn test_struct_with_methods() {
        let result = analyze(
            r#"package main

import (
	"fmt"
	"strings"
)

// User represents a user in the system
type User struct {
	ID   int
	Name string
	Email string
}

// GetDisplayName returns the display name
func (u *User) GetDisplayName() string {
	return strings.Title(u.Name)
}

// Validate checks if the user is valid
func (u *User) Validate() error {
	if u.Name == "" {
		return fmt.Errorf("name is required")
	}
	return nil
}"#,
        );

        assert!(result.functions.is_empty());
        assert_eq!(result.imports.len(), 2);
        assert_eq!(result.classes.len(), 1);

        let user = &result.classes[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.kind, ClassKind::Struct);
        assert_eq!(user.documentation, "User represents a user in the system");
        let fields: Vec<_> = user.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(fields, vec!["ID", "Name", "Email"]);

        let methods: Vec<_> = user.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["GetDisplayName", "Validate"]);
        assert_eq!(user.methods[0].return_type, "string");
        assert_eq!(user.methods[1].complexity, 2);
        assert_eq!(user.methods[1].documentation, "Validate checks if the user is valid");
    }

    #[test]
    fn test_interface_definition() {
        let result = analyze(
            r#"package main

// Repository defines data access methods
type Repository interface {
	Get(id int) (*User, error)
	Save(user *User) error
}"#,
        );

        assert_eq!(result.classes.len(), 1);
        assert_eq!(result.classes[0].kind, ClassKind::Interface);
        assert!(result.classes[0].methods.is_empty());
        assert!(result.classes[0].properties.is_empty());
    }

    #[test]
    fn test_alias_types() {
        let result = analyze(
            r#"package main

type ID string

type Handler = func(int) error
"#,
        );

        assert_eq!(result.classes.len(), 2);
        assert!(result.classes.iter().all(|c| c.kind == ClassKind::Alias));
    }

    #[test]
    fn test_syntax_error() {
        let result = analyze(
            r#"package main

func broken() {
	fmt.Println("missing import"
}"#,
        );

        assert_eq!(result.errors.len(), 1);
        assert!(result.functions.is_empty());
        assert!(result.classes.is_empty());
        assert!(result.imports.is_empty());
        assert!(result.errors[0].line >= 1);
        assert!(result.errors[0].message.starts_with("syntax error"));
    }

    #[test]
    fn test_complexity_calculation() {
        let result = analyze(
            r#"package main

func SimpleFunction() {
	// nothing
}

func ConditionalFunction(x int) int {
	if x > 0 {
		return x
	} else if x < 0 {
		return -x
	}
	return 0
}

func LoopFunction(items []int) int {
	sum := 0
	for _, item := range items {
		sum += item
	}
	return sum
}

func SwitchFunction(x int) string {
	switch x {
	case 1:
		return "one"
	case 2:
		return "two"
	default:
		return "other"
	}
}

func TypeSwitch(v interface{}) string {
	switch v.(type) {
	case int:
		return "int"
	}
	return "other"
}

func Wait(a, b chan int) {
	select {
	case <-a:
	default:
	}
}"#,
        );

        assert_eq!(result.functions.len(), 6);
        assert_eq!(function(&result, "SimpleFunction").complexity, 1);
        assert_eq!(function(&result, "ConditionalFunction").complexity, 3);
        assert_eq!(function(&result, "LoopFunction").complexity, 2);
        // switch + two cases + default
        assert_eq!(function(&result, "SwitchFunction").complexity, 5);
        assert_eq!(function(&result, "TypeSwitch").complexity, 3);
        assert_eq!(function(&result, "Wait").complexity, 1);
    }

    #[test]
    fn test_two_ifs_and_a_loop() {
        let result = analyze(
            r#"package main

func Sum(xs []int) int {
	total := 0
	if len(xs) == 0 {
		return 0
	}
	for _, x := range xs {
		total += x
	}
	if total < 0 {
		return -total
	}
	return total
}"#,
        );

        assert_eq!(function(&result, "Sum").complexity, 4);
    }

    #[test]
    fn test_method_before_type_is_linked() {
        let result = analyze(
            r#"package main

// Add adds two numbers
func (c *Calculator) Add(a, b float64) float64 {
	return a + b
}

func (c Calculator) Precision() int {
	return c.precision
}

type Calculator struct {
	precision int
}
"#,
        );

        assert!(result.functions.is_empty());
        let calc = &result.classes[0];
        assert_eq!(calc.methods.len(), 2);

        let add = &calc.methods[0];
        assert_eq!(add.documentation, "Add adds two numbers");
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(add.parameters[1].name, "b");
        assert_eq!(add.parameters[1].type_name, "float64");
        assert_eq!(add.return_type, "float64");
        assert!(!calc.properties[0].is_public);
    }

    #[test]
    fn test_method_without_type_is_dropped() {
        let result = analyze(
            r#"package main

func (s *Server) Start() error {
	return nil
}
"#,
        );

        assert!(result.functions.is_empty());
        assert!(result.classes.is_empty());
        assert_eq!(result.all_functions().count(), 0);
    }

    #[test]
    fn test_generic_receiver() {
        let result = analyze(
            r#"package main

type Stack[T any] struct {
	items []T
}

func (s *Stack[T]) Push(v T) {
	s.items = append(s.items, v)
}
"#,
        );

        assert_eq!(result.classes[0].name, "Stack");
        assert_eq!(result.classes[0].methods.len(), 1);
    }

    #[test]
    fn test_embedded_field() {
        let result = analyze(
            r#"package main

import "sync"

type Cache struct {
	sync.Mutex
	*Base
	data, index map[string]string
}
"#,
        );

        let props = &result.classes[0].properties;
        let names: Vec<_> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["sync.Mutex", "Base", "data", "index"]);
        assert!(props[0].is_public);
        assert_eq!(props[2].type_name, "map[string]string");
    }

    #[test]
    fn test_imports_with_alias() {
        let result = analyze(
            r#"package main

import (
	"fmt"
	str "strings"
	_ "embed"
	. "math"
)
"#,
        );

        assert_eq!(result.imports.len(), 4);
        assert_eq!(result.imports[0].alias, None);
        assert_eq!(result.imports[1].path, "strings");
        assert_eq!(result.imports[1].alias.as_deref(), Some("str"));
        assert_eq!(result.imports[2].alias.as_deref(), Some("_"));
        assert_eq!(result.imports[3].alias.as_deref(), Some("."));
        assert_eq!(result.imports[3].line, 7);
    }

    #[test]
    fn test_multiple_results_and_variadic() {
        let result = analyze(
            r#"package main

func Parse(format string, args ...any) (int, error) {
	return 0, nil
}
"#,
        );

        let parse = &result.functions[0];
        assert_eq!(parse.return_type, "int, error");
        assert_eq!(parse.parameters.len(), 2);
        assert_eq!(parse.parameters[1].name, "args");
        assert_eq!(parse.parameters[1].type_name, "...any");
    }

    #[test]
    fn test_comment_groups() {
        let result = analyze(
            r#"package main

// First line
// second line
func A() {}

/* block */
func B() {}

// detached

func c() {}
"#,
        );

        assert_eq!(result.comments.len(), 3);
        let group = &result.comments[0];
        assert_eq!(group.text, "First line\nsecond line");
        assert_eq!((group.start_line, group.end_line), (3, 4));
        assert!(group.is_block);
        assert!(result.comments[1].is_block);
        assert_eq!(result.comments[1].text, "block");
        assert!(!result.comments[2].is_block);

        assert_eq!(function(&result, "A").documentation, "First line\nsecond line");
        assert_eq!(function(&result, "B").documentation, "block");
        assert_eq!(function(&result, "c").documentation, "");
        assert!(!function(&result, "c").is_public);
    }

    #[test]
    fn test_test_functions() {
        let result = analyze(
            r#"package main

import "testing"

func TestAdd(t *testing.T) {}

func BenchmarkAdd(b *testing.B) {}

func helper() {}
"#,
        );

        assert!(function(&result, "TestAdd").is_test);
        assert!(function(&result, "BenchmarkAdd").is_test);
        assert!(!function(&result, "helper").is_test);
    }

    #[test]
    fn test_empty_input() {
        let result = analyze("");
        assert!(result.errors.is_empty());
        assert!(result.functions.is_empty());
        assert!(result.comments.is_empty());
    }
}
