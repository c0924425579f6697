//! Ruby (dry-struct / dry-types) module generation.
//!
//! One pass over the declaration plan; every expression comes from [`Lowerer`].
use crate::attributes::{DESCRIPTION, Descriptions, PROPERTY_DESCRIPTIONS};
use crate::declarations::{Declaration, plan_declarations};
use crate::error::GenError;
use crate::ir::{ClassType, EnumType, Name, Type, TypeGraph, TypeRef, UnionType};
use crate::lower::Lowerer;

const INDENT: &str = "  ";

#[derive(Debug, Clone, Default)]
pub struct RubyOptions {
    /// Only declare the types; no `from_dynamic!`/`to_dynamic` and no top-level wrappers.
    pub just_types: bool,
    /// Replaces the default header comment.
    pub leading_comments: Option<Vec<String>>,
}

pub struct Codegen<'g> {
    lower: Lowerer<'g>,
    options: RubyOptions,
    out: String,
    depth: usize,
    pending_blank: bool,
}

impl<'g> Codegen<'g> {
    pub fn new(graph: &'g TypeGraph, options: RubyOptions) -> Self {
        Self {
            lower: Lowerer::new(graph),
            options,
            out: String::new(),
            depth: 0,
            pending_blank: false,
        }
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn graph(&self) -> &'g TypeGraph {
        self.lower.graph()
    }

    // ---------------------------- text plumbing ------------------------------ //

    fn line(&mut self, text: impl AsRef<str>) {
        if self.pending_blank {
            self.out.push('\n');
            self.pending_blank = false;
        }
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn ensure_blank_line(&mut self) {
        if !self.out.is_empty() {
            self.pending_blank = true;
        }
    }

    fn indent(&mut self, body: impl FnOnce(&mut Self) -> Result<(), GenError>) -> Result<(), GenError> {
        self.depth += 1;
        // no blank line right after an opening line
        self.pending_blank = false;
        let result = body(self);
        self.pending_blank = false;
        self.depth -= 1;
        result
    }

    fn block(
        &mut self,
        header: impl AsRef<str>,
        body: impl FnOnce(&mut Self) -> Result<(), GenError>,
    ) -> Result<(), GenError> {
        self.line(header);
        self.indent(body)?;
        self.line("end");
        Ok(())
    }

    fn comment_lines<S: AsRef<str>>(&mut self, lines: impl IntoIterator<Item = S>) {
        for l in lines {
            let l = l.as_ref();
            if l.is_empty() { self.line("#") } else { self.line(format!("# {l}")) }
        }
    }

    fn description(&mut self, descriptions: Option<&Descriptions>) {
        let Some(descriptions) = descriptions else { return };
        let lines: Vec<String> = descriptions
            .iter()
            .flat_map(|d| d.lines().map(str::to_string).collect::<Vec<_>>())
            .collect();
        self.comment_lines(lines);
    }

    // ------------------------------- module ---------------------------------- //

    pub fn emit(&mut self) -> Result<(), GenError> {
        let graph = self.graph();
        let plan = plan_declarations(graph);

        self.leading_comments();
        self.ensure_blank_line();
        self.line("require 'json'");
        self.line("require 'dry-types'");
        self.line("require 'dry-struct'");
        self.ensure_blank_line();

        self.block("module Types", |cg| {
            cg.line("include Dry.Types(default: :nominal)");
            for r in &plan.enums {
                if let Type::Enum(e) = graph.get(*r) {
                    cg.enum_schema(e);
                }
            }
            Ok(())
        })?;

        for r in &plan.enums {
            if let Type::Enum(e) = graph.get(*r) {
                self.ensure_blank_line();
                self.enum_module(*r, e)?;
            }
        }

        for decl in plan.declarations() {
            self.ensure_blank_line();
            match decl {
                Declaration::Forward(r) => self.forward_declaration(r)?,
                Declaration::Define(r) => match graph.get(r) {
                    Type::Class(c) => self.class(r, c)?,
                    Type::Union(u) => self.union(r, u)?,
                    other => {
                        return Err(GenError::Document(format!(
                            "cannot declare a {} as a Ruby class",
                            other.kind_name()
                        )));
                    }
                },
            }
        }

        if !self.options.just_types {
            for (name, r) in graph.top_levels() {
                if graph.declared_name(r).is_some_and(|n| n.as_str() == name) {
                    continue;
                }
                self.ensure_blank_line();
                self.top_level(name, r)?;
            }
        }

        tracing::info!(
            bytes = self.out.len(),
            declarations = plan.ordered.len(),
            forward = plan.forward.len(),
            "rendered ruby module"
        );
        Ok(())
    }

    fn leading_comments(&mut self) {
        if let Some(lines) = self.options.leading_comments.clone() {
            self.comment_lines(lines);
            return;
        }
        if self.options.just_types {
            return;
        }
        self.comment_lines([
            "This code may look unusually verbose for Ruby (and it is), but",
            "it performs some subtle and complex validation of JSON data.",
            "",
            "To parse this JSON, add 'dry-struct' and 'dry-types' gems, then do:",
            "",
        ]);
        let graph = self.graph();
        for (name, r) in graph.top_levels() {
            self.line(format!("#   value = {name}.from_json! {}", ruby_string(json_sample(graph.get(r)))));
            self.line("#");
        }
        self.comment_lines(["If from_json! succeeds, the value returned matches the schema."]);
    }

    fn forward_declaration(&mut self, r: TypeRef) -> Result<(), GenError> {
        let name = self.struct_name(r)?;
        self.comment_lines(["(forward declaration)"]);
        self.line(format!("class {name} < Dry::Struct; end"));
        Ok(())
    }

    fn struct_name(&self, r: TypeRef) -> Result<Name, GenError> {
        match self.graph().get(r) {
            Type::Class(c) => Ok(c.name.clone()),
            Type::Union(u) if self.graph().nullable_from_union(u).is_none() => Ok(u.name.clone()),
            Type::Union(u) => Err(GenError::ErasedUnion { name: u.name.to_string() }),
            other => Err(GenError::Document(format!(
                "cannot forward-declare a {}",
                other.kind_name()
            ))),
        }
    }

    // -------------------------------- enums ---------------------------------- //

    fn enum_schema(&mut self, e: &EnumType) {
        let cases: Vec<String> = e.cases.keys().map(|json| ruby_string(json)).collect();
        self.line(format!("{} = Types::Strict::String.enum({})", e.name, cases.join(", ")));
    }

    fn enum_module(&mut self, r: TypeRef, e: &EnumType) -> Result<(), GenError> {
        tracing::debug!(name = %e.name, cases = e.cases.len(), "emitting enum");
        self.description(self.graph().attributes(r).get(&*DESCRIPTION));
        self.block(format!("module {}", e.name), |cg| {
            for (json, constant) in &e.cases {
                cg.line(format!("{constant} = {}", ruby_string(json)));
            }
            Ok(())
        })
    }

    // ------------------------------- classes --------------------------------- //

    fn class(&mut self, r: TypeRef, c: &ClassType) -> Result<(), GenError> {
        tracing::debug!(name = %c.name, properties = c.properties.len(), "emitting class");
        let graph = self.graph();
        let lower = self.lower;
        let property_descriptions = graph.attributes(r).get(&*PROPERTY_DESCRIPTIONS);

        self.description(graph.attributes(r).get(&*DESCRIPTION));
        self.block(format!("class {} < Dry::Struct", c.name), |cg| {
            for (json, p) in &c.properties {
                let described = property_descriptions.and_then(|m| m.get(json));
                if described.is_some() {
                    cg.ensure_blank_line();
                    cg.description(described);
                }
                cg.line(format!("attribute :{}, {}", p.member, lower.dry_type(p.ty, p.is_optional)));
                if described.is_some() {
                    cg.ensure_blank_line();
                }
            }

            if cg.options.just_types {
                return Ok(());
            }

            cg.ensure_blank_line();
            cg.block("def self.from_dynamic!(d)", |cg| {
                cg.line("d = Types::Strict::Hash[d]");
                cg.line("new(");
                cg.indent(|cg| {
                    for (json, p) in &c.properties {
                        let dynamic = format!("d[{}]", ruby_string(json));
                        let expression = lower.from_dynamic(p.ty, &dynamic, p.is_optional, false);
                        cg.line(format!("{}: {expression},", p.member));
                    }
                    Ok(())
                })?;
                cg.line(")");
                Ok(())
            })?;

            cg.ensure_blank_line();
            cg.json_constructor()?;

            cg.ensure_blank_line();
            cg.block("def to_dynamic", |cg| {
                cg.line("{");
                cg.indent(|cg| {
                    for (json, p) in &c.properties {
                        let expression = lower.to_dynamic(p.ty, &format!("@{}", p.member), p.is_optional);
                        cg.line(format!("{} => {expression},", ruby_string(json)));
                    }
                    Ok(())
                })?;
                cg.line("}");
                Ok(())
            })?;

            cg.ensure_blank_line();
            cg.json_serializer()
        })
    }

    fn json_constructor(&mut self) -> Result<(), GenError> {
        self.block("def self.from_json!(json)", |cg| {
            cg.line("from_dynamic!(JSON.parse(json))");
            Ok(())
        })
    }

    fn json_serializer(&mut self) -> Result<(), GenError> {
        self.block("def to_json(options = nil)", |cg| {
            cg.line("JSON.generate(to_dynamic, options)");
            Ok(())
        })
    }

    // -------------------------------- unions --------------------------------- //

    fn union(&mut self, r: TypeRef, u: &UnionType) -> Result<(), GenError> {
        tracing::debug!(name = %u.name, members = u.members.len(), "emitting union");
        let plan = self.lower.union_plan(u)?;

        self.description(self.graph().attributes(r).get(&*DESCRIPTION));
        self.block(format!("class {} < Dry::Struct", u.name), |cg| {
            for slot in &plan.slots {
                cg.line(format!("attribute :{}, {}", slot.name, slot.schema));
            }

            if cg.options.just_types {
                return Ok(());
            }

            cg.ensure_blank_line();
            cg.block("def self.from_dynamic!(d)", |cg| {
                cg.line("union = new(");
                cg.indent(|cg| {
                    for slot in &plan.slots {
                        cg.line(format!("{}: {},", slot.name, slot.attempt));
                    }
                    Ok(())
                })?;
                cg.line(")");
                cg.line(plan.invalid_union_guard("union", "d"));
                cg.line("union");
                Ok(())
            })?;

            cg.ensure_blank_line();
            cg.json_constructor()?;

            cg.ensure_blank_line();
            cg.block("def to_dynamic", |cg| {
                for (i, slot) in plan.slots.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elsif" };
                    cg.line(format!("{keyword} !@{}.nil?", slot.name));
                    cg.indent(|cg| {
                        cg.line(&slot.encode);
                        Ok(())
                    })?;
                }
                cg.line("else");
                cg.indent(|cg| {
                    cg.line("nil");
                    Ok(())
                })?;
                cg.line("end");
                Ok(())
            })?;

            cg.ensure_blank_line();
            cg.json_serializer()
        })
    }

    // ------------------------------ top-levels ------------------------------- //

    fn top_level(&mut self, name: &str, r: TypeRef) -> Result<(), GenError> {
        tracing::debug!(name, kind = self.graph().get(r).kind_name(), "emitting top-level wrapper");
        let lower = self.lower;
        // arrays and hashes can carry their own to_json; other values rely on the json gem
        let own_to_json = matches!(self.graph().get(r), Type::Array { .. } | Type::Map { .. })
            && !lower.marshals_implicitly_to_dynamic(r);

        self.block(format!("class {name}"), |cg| {
            cg.block("def self.from_json!(json)", |cg| {
                let decoded = lower.from_dynamic(r, "JSON.parse(json)", false, true);
                if own_to_json {
                    cg.line(format!("value = {decoded}"));
                    cg.block("value.define_singleton_method(:to_json) do |options = nil|", |cg| {
                        cg.line(format!("JSON.generate({}, options)", lower.to_dynamic(r, "self", false)));
                        Ok(())
                    })?;
                    cg.line("value");
                } else {
                    cg.line(decoded);
                }
                Ok(())
            })
        })
    }
}

/// Render the whole graph as one Ruby module.
pub fn render_ruby(graph: &TypeGraph, options: RubyOptions) -> Result<String, GenError> {
    let mut cg = Codegen::new(graph, options);
    cg.emit()?;
    Ok(cg.into_string())
}

fn json_sample(t: &Type) -> &'static str {
    match t {
        Type::Array { .. } => "[…]",
        Type::Map { .. } | Type::Class(_) => "{…}",
        _ => "…",
    }
}

/// Double-quoted Ruby literal. `#` is escaped so `#{` never interpolates.
pub fn ruby_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '#' => out.push_str("\\#"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if !is_printable(c) => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// False for control, format, line/paragraph separator, private-use and
/// noncharacter code points.
fn is_printable(c: char) -> bool {
    if c.is_control() {
        return false;
    }
    let cp = c as u32;
    !matches!(
        cp,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x180E
            | 0x200B..=0x200F
            | 0x2028..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xE000..=0xF8FF
            | 0xFDD0..=0xFDEF
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE0001
            | 0xE0020..=0xE007F
            | 0xF0000..=0x10FFFF
    ) && cp & 0xFFFE != 0xFFFE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_de::graph_from_str;
    use serde_json::json;

    fn render(doc: serde_json::Value, options: RubyOptions) -> String {
        let graph = graph_from_str(&doc.to_string()).unwrap();
        render_ruby(&graph, options).unwrap()
    }

    fn person_doc() -> serde_json::Value {
        json!({
            "types": [
                {"kind": "class", "name": "Person", "description": ["A person."],
                 "properties": {
                    "name": {"type": 1},
                    "nick-name": {"type": 2, "name": "nick_name", "description": ["What friends say."]},
                    "age": {"type": 3, "optional": true},
                    "tags": {"type": 4},
                    "mood": {"type": 5, "optional": true}
                 }},
                {"kind": "string"},
                {"kind": "union", "name": "NickName", "members": [1, 6]},
                {"kind": "integer"},
                {"kind": "array", "items": 1},
                {"kind": "enum", "name": "Mood", "cases": {"happy": "Happy", "sad": "Sad"}},
                {"kind": "null"}
            ],
            "top_levels": {"Person": 0}
        })
    }

    #[test]
    fn class_declaration_and_marshaling() {
        let src = render(person_doc(), RubyOptions::default());
        assert!(src.contains("require 'dry-struct'"));
        assert!(src.contains("  Mood = Types::Strict::String.enum(\"happy\", \"sad\")"));
        assert!(src.contains("module Mood\n  Happy = \"happy\"\n  Sad = \"sad\"\nend"));
        assert!(src.contains("# A person.\nclass Person < Dry::Struct\n"));
        assert!(src.contains("  attribute :name, Types::Strict::String\n"));
        assert!(src.contains("  # What friends say.\n  attribute :nick_name, Types::Strict::String.optional\n"));
        assert!(src.contains("  attribute :age, Types::Strict::Integer.optional\n"));
        assert!(src.contains("  attribute :tags, Types::Strict::Array.of(Types::Strict::String)\n"));
        assert!(src.contains("  attribute :mood, Types::Mood.optional\n"));

        assert!(src.contains("      nick_name: d[\"nick-name\"].nil? ? nil : d[\"nick-name\"],\n"));
        assert!(src.contains("      mood: d[\"mood\"].nil? ? nil : Types::Mood[d[\"mood\"]],\n"));
        assert!(src.contains("      tags: Types::Strict::Array[d[\"tags\"]].map { |x| Types::Strict::String[x] },\n"));
        assert!(src.contains("      \"nick-name\" => @nick_name,\n"));
        assert!(src.contains("      \"tags\" => @tags,\n"));
        assert!(src.contains("  def to_json(options = nil)\n    JSON.generate(to_dynamic, options)\n  end\n"));

        // nullable unions never get a declaration of their own
        assert!(!src.contains("NickName"));
        // named top-level: no wrapper
        assert_eq!(src.matches("class Person").count(), 1);
    }

    #[test]
    fn just_types_drops_marshaling() {
        let src = render(person_doc(), RubyOptions { just_types: true, ..Default::default() });
        assert!(src.contains("attribute :name"));
        assert!(!src.contains("from_dynamic!"));
        assert!(!src.contains("to_json"));
        assert!(!src.starts_with('#'));
    }

    #[test]
    fn leading_comments_replace_the_header() {
        let src = render(
            person_doc(),
            RubyOptions { leading_comments: Some(vec!["Generated.".into(), "".into()]), ..Default::default() },
        );
        assert!(src.starts_with("# Generated.\n#\n\nrequire 'json'"));
        assert!(!src.contains("unusually verbose"));
    }

    #[test]
    fn unions_try_every_member() {
        let src = render(
            json!({
                "types": [
                    {"kind": "union", "name": "Value", "members": [1, 2, 3]},
                    {"kind": "integer"},
                    {"kind": "string"},
                    {"kind": "null"},
                    {"kind": "array", "items": 0}
                ],
                "top_levels": {"Values": 4}
            }),
            RubyOptions::default(),
        );
        assert!(src.contains("class Value < Dry::Struct\n  attribute :integer, Types::Strict::Integer.optional\n  attribute :string, Types::Strict::String.optional\n"));
        assert!(src.contains("    union = new(\n      integer: (Types::Strict::Integer[d] rescue nil),\n      string: (Types::Strict::String[d] rescue nil),\n    )\n"));
        assert!(src.contains("raise \"Invalid union\" if union.attributes.values.all?(&:nil?) && !d.nil?"));
        assert!(src.contains("    if !@integer.nil?\n      @integer\n    elsif !@string.nil?\n      @string\n    else\n      nil\n    end\n"));

        // array top-level gets a wrapper with its own to_json
        assert!(src.contains("class Values\n  def self.from_json!(json)\n    value = Types::Strict::Array[JSON.parse(json)].map { |x| Value.from_dynamic!(x) }\n"));
        assert!(src.contains("JSON.generate(self.map { |x| x.to_dynamic }, options)"));
        assert!(src.contains("#   value = Values.from_json! \"[…]\""));
    }

    #[test]
    fn cyclic_classes_are_stubbed_before_use() {
        let src = render(
            json!({
                "types": [
                    {"kind": "class", "name": "Node", "properties": {"next": {"type": 0, "optional": true}}},
                ],
                "top_levels": {"Node": 0}
            }),
            RubyOptions::default(),
        );
        let stub = src.find("class Node < Dry::Struct; end").unwrap();
        let body = src.find("class Node < Dry::Struct\n").unwrap();
        assert!(stub < body);
        assert!(src.contains("# (forward declaration)\nclass Node < Dry::Struct; end"));
        assert!(src.contains("attribute :next, Types.Instance(Node).optional"));
        assert!(src.contains("next: d[\"next\"] ? Node.from_dynamic!(d[\"next\"]) : nil,"));
        assert!(src.contains("\"next\" => @next&.to_dynamic,"));
    }

    #[test]
    fn ruby_strings_are_escaped() {
        assert_eq!(ruby_string("plain"), "\"plain\"");
        assert_eq!(ruby_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(ruby_string("#{x}"), "\"\\#{x}\"");
        assert_eq!(ruby_string("\u{1}"), "\"\\u{1}\"");
        assert_eq!(ruby_string("a\u{2028}b"), "\"a\\u{2028}b\"");
        assert_eq!(ruby_string("\u{feff}x"), "\"\\u{feff}x\"");
        assert_eq!(ruby_string("zero\u{200b}width"), "\"zero\\u{200b}width\"");
        assert_eq!(ruby_string("\u{fffe}"), "\"\\u{fffe}\"");
        // printable non-ASCII stays as is
        assert_eq!(ruby_string("café ✅"), "\"café ✅\"");
    }

    #[test]
    fn container_properties_check_their_shape() {
        let src = render(
            json!({
                "types": [
                    {"kind": "class", "name": "Bag", "properties": {
                        "m": {"type": 1},
                        "xs": {"type": 3},
                        "opt": {"type": 1, "optional": true},
                        "price": {"type": 4}
                    }},
                    {"kind": "map", "values": 2},
                    {"kind": "string"},
                    {"kind": "array", "items": 5},
                    {"kind": "double"},
                    {"kind": "any"}
                ],
                "top_levels": {"Bag": 0}
            }),
            RubyOptions::default(),
        );
        assert!(src.contains("      m: Types::Strict::Hash[d[\"m\"]].map { |k, v| [k, Types::Strict::String[v]] }.to_h,\n"));
        assert!(src.contains("      xs: Types::Strict::Array[d[\"xs\"]].map { |x| Types::Any[x] },\n"));
        assert!(src.contains(
            "      opt: Types::Strict::Hash.optional[d[\"opt\"]]&.map { |k, v| [k, Types::Strict::String[v]] }&.to_h,\n"
        ));
        assert!(src.contains("  attribute :price, (Types::Strict::Integer | Types::Strict::Float)\n"));
        assert!(!src.contains("Decimal"));
    }

    #[test]
    fn false_fills_a_bool_slot() {
        let src = render(
            json!({
                "types": [
                    {"kind": "union", "name": "Flag", "members": [1, 2]},
                    {"kind": "bool"},
                    {"kind": "string"}
                ],
                "top_levels": {"Flag": 0}
            }),
            RubyOptions::default(),
        );
        assert!(src.contains("      bool: (Types::Strict::Bool[d] rescue nil),\n"));
        // nil checks, not truthiness, so a false slot still counts and encodes
        assert!(src.contains("raise \"Invalid union\" if union.attributes.values.all?(&:nil?)\n"));
        assert!(src.contains("    if !@bool.nil?\n      @bool\n    elsif !@string.nil?\n"));
        assert!(!src.contains("if @bool\n"));
    }
}
