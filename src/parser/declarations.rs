//! Declaration parsing: variables, functions, types, protocols, extensions.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::TokenKind;
use crate::parser::core::{ParseResult, Parser};
use crate::span::Span;

/// Modifiers collected in front of a declaration.
#[derive(Debug, Clone, Default)]
pub(crate) struct Modifiers {
    pub access: Option<Access>,
    pub is_static: bool,
    pub is_lazy: bool,
    pub is_mutating: bool,
    pub is_override: bool,
    pub ownership: Ownership,
}

impl Parser {
    pub(crate) fn declaration(&mut self) -> ParseResult<Stmt> {
        // Swallow stray semicolons between statements.
        while self.match_token(&TokenKind::Semicolon) {}
        if self.is_at_end() {
            return Ok(Stmt::new(StmtKind::Block(Vec::new()), self.current_span()));
        }

        let span = self.current_span();
        let modifiers = self.parse_modifiers();

        let stmt = match &self.peek().kind {
            TokenKind::Var => {
                self.advance();
                self.var_declaration(false, modifiers, span)?
            }
            TokenKind::Let => {
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.tuple_destructure(true, span)?
                } else {
                    self.var_declaration(true, modifiers, span)?
                }
            }
            TokenKind::Func => {
                self.advance();
                let decl = self.func_declaration(modifiers, span)?;
                Stmt::new(StmtKind::Function(decl), span)
            }
            TokenKind::Class => {
                self.advance();
                let decl = self.class_declaration(modifiers, span)?;
                Stmt::new(StmtKind::Class(decl), span)
            }
            TokenKind::Struct => {
                self.advance();
                let decl = self.struct_declaration(modifiers, span)?;
                Stmt::new(StmtKind::Struct(decl), span)
            }
            TokenKind::Enum => {
                self.advance();
                let decl = self.enum_declaration(modifiers, span)?;
                Stmt::new(StmtKind::Enum(decl), span)
            }
            TokenKind::Protocol => {
                self.advance();
                let decl = self.protocol_declaration(span)?;
                Stmt::new(StmtKind::Protocol(decl), span)
            }
            TokenKind::Extension => {
                self.advance();
                let decl = self.extension_declaration(span)?;
                Stmt::new(StmtKind::Extension(decl), span)
            }
            TokenKind::Import => {
                self.advance();
                let name = self.expect_identifier()?;
                Stmt::new(StmtKind::Import(name), span)
            }
            _ => self.statement()?,
        };

        self.match_token(&TokenKind::Semicolon);
        Ok(stmt)
    }

    pub(crate) fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            match self.peek().kind {
                TokenKind::Private => {
                    modifiers.access = Some(Access::Private);
                    self.advance();
                }
                TokenKind::Fileprivate => {
                    modifiers.access = Some(Access::Fileprivate);
                    self.advance();
                }
                TokenKind::Internal => {
                    modifiers.access = Some(Access::Internal);
                    self.advance();
                }
                TokenKind::Public => {
                    modifiers.access = Some(Access::Public);
                    self.advance();
                }
                TokenKind::Static => {
                    modifiers.is_static = true;
                    self.advance();
                }
                TokenKind::Lazy => {
                    modifiers.is_lazy = true;
                    self.advance();
                }
                TokenKind::Weak => {
                    modifiers.ownership = Ownership::Weak;
                    self.advance();
                }
                TokenKind::Unowned => {
                    modifiers.ownership = Ownership::Unowned;
                    self.advance();
                }
                TokenKind::Mutating => {
                    modifiers.is_mutating = true;
                    self.advance();
                }
                TokenKind::Override => {
                    modifiers.is_override = true;
                    self.advance();
                }
                _ => break,
            }
        }
        modifiers
    }

    /// `var`/`let` declaration. The keyword has been consumed.
    pub(crate) fn var_declaration(
        &mut self,
        is_let: bool,
        modifiers: Modifiers,
        span: Span,
    ) -> ParseResult<Stmt> {
        let decl = self.var_decl_body(is_let, modifiers, span)?;
        Ok(Stmt::new(StmtKind::Var(decl), span))
    }

    pub(crate) fn var_decl_body(
        &mut self,
        is_let: bool,
        modifiers: Modifiers,
        span: Span,
    ) -> ParseResult<VarDecl> {
        let name = self.expect_identifier()?;

        let type_annotation = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let mut initializer = None;
        let mut accessors = None;
        let mut observers = None;

        if self.match_token(&TokenKind::Equal) {
            initializer = Some(self.expression()?);
            // Observers may follow an initializer: `var x = 0 { didSet {…} }`
            if self.check(&TokenKind::LeftBrace) && self.observers_follow() {
                observers = Some(self.parse_observers()?);
            }
        } else if self.check(&TokenKind::LeftBrace) {
            if self.observers_follow() {
                observers = Some(self.parse_observers()?);
            } else {
                accessors = Some(self.parse_accessors()?);
            }
        }

        Ok(VarDecl {
            name,
            is_let,
            type_annotation,
            initializer,
            accessors,
            observers,
            access: modifiers.access.unwrap_or_default(),
            is_static: modifiers.is_static,
            is_lazy: modifiers.is_lazy,
            ownership: modifiers.ownership,
            span,
        })
    }

    /// Lookahead: does the `{` block start with `willSet` or `didSet`?
    fn observers_follow(&self) -> bool {
        matches!(&self.peek_nth(1).kind,
            TokenKind::Identifier(name) if name == "willSet" || name == "didSet")
    }

    fn parse_observers(&mut self) -> ParseResult<Observers> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut will_set = None;
        let mut did_set = None;

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let name = self.expect_identifier()?;
            let param = if self.match_token(&TokenKind::LeftParen) {
                let p = self.expect_identifier()?;
                self.expect(&TokenKind::RightParen)?;
                Some(p)
            } else {
                None
            };
            let body = self.block()?;
            match name.as_str() {
                "willSet" => {
                    will_set = Some((param.unwrap_or_else(|| "newValue".to_string()), body))
                }
                "didSet" => did_set = Some((param.unwrap_or_else(|| "oldValue".to_string()), body)),
                other => {
                    return Err(ParseError::general(
                        format!("Expected willSet or didSet, found '{}'", other),
                        self.previous_span(),
                    ))
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Observers { will_set, did_set })
    }

    /// `{ get { … } set(v) { … } }` or the read-only shorthand
    /// `{ return expr }` which desugars to a bare getter.
    fn parse_accessors(&mut self) -> ParseResult<Accessors> {
        self.expect(&TokenKind::LeftBrace)?;

        let is_accessor_keyword = matches!(&self.peek().kind,
            TokenKind::Identifier(name) if name == "get" || name == "set");

        if !is_accessor_keyword {
            // Read-only shorthand: the block body is the getter.
            let mut getter = Vec::new();
            while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
                getter.push(self.declaration()?);
            }
            self.expect(&TokenKind::RightBrace)?;
            return Ok(Accessors {
                getter,
                setter: None,
            });
        }

        let mut getter = None;
        let mut setter = None;
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let name = self.expect_identifier()?;
            match name.as_str() {
                "get" => {
                    getter = Some(self.block()?);
                }
                "set" => {
                    let param = if self.match_token(&TokenKind::LeftParen) {
                        let p = self.expect_identifier()?;
                        self.expect(&TokenKind::RightParen)?;
                        p
                    } else {
                        "newValue".to_string()
                    };
                    setter = Some((param, self.block()?));
                }
                other => {
                    return Err(ParseError::general(
                        format!("Expected get or set, found '{}'", other),
                        self.previous_span(),
                    ))
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        let getter = getter.ok_or_else(|| {
            ParseError::general("Computed property requires a getter", self.previous_span())
        })?;
        Ok(Accessors { getter, setter })
    }

    /// `let (a, b) = expr` tuple destructuring.
    fn tuple_destructure(&mut self, is_let: bool, span: Span) -> ParseResult<Stmt> {
        self.expect(&TokenKind::LeftParen)?;
        let mut names = Vec::new();
        loop {
            if self.match_token(&TokenKind::Underscore) {
                names.push("_".to_string());
            } else {
                names.push(self.expect_identifier()?);
            }
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::Equal)?;
        let value = self.expression()?;
        Ok(Stmt::new(
            StmtKind::TupleDestructure {
                names,
                is_let,
                value,
            },
            span,
        ))
    }

    /// `func` declaration. The keyword has been consumed.
    pub(crate) fn func_declaration(
        &mut self,
        modifiers: Modifiers,
        span: Span,
    ) -> ParseResult<FuncDecl> {
        let name = self.func_name()?;
        let generic_params = self.generic_params()?;
        let params = self.parameter_list()?;

        let return_type = if self.match_token(&TokenKind::Arrow) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let expected_error = if self.match_token(&TokenKind::Expected) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let body = self.block()?;

        Ok(FuncDecl {
            name,
            generic_params,
            params,
            return_type,
            expected_error,
            body,
            access: modifiers.access.unwrap_or_default(),
            is_static: modifiers.is_static,
            is_mutating: modifiers.is_mutating,
            is_override: modifiers.is_override,
            span,
        })
    }

    /// A function name: an identifier or an overloadable operator symbol.
    fn func_name(&mut self) -> ParseResult<String> {
        let name = match &self.peek().kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::Plus => "+".to_string(),
            TokenKind::Minus => "-".to_string(),
            TokenKind::Star => "*".to_string(),
            TokenKind::Slash => "/".to_string(),
            TokenKind::Percent => "%".to_string(),
            TokenKind::EqualEqual => "==".to_string(),
            TokenKind::BangEqual => "!=".to_string(),
            TokenKind::Less => "<".to_string(),
            TokenKind::LessEqual => "<=".to_string(),
            TokenKind::Greater => ">".to_string(),
            TokenKind::GreaterEqual => ">=".to_string(),
            _ => return Err(self.unexpected("function name")),
        };
        self.advance();
        Ok(name)
    }

    /// `<T, U: Proto>` generic parameter list, if present.
    pub(crate) fn generic_params(&mut self) -> ParseResult<Vec<GenericParam>> {
        let mut params = Vec::new();
        if self.match_token(&TokenKind::Less) {
            loop {
                let name = self.expect_identifier()?;
                let constraint = if self.match_token(&TokenKind::Colon) {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                params.push(GenericParam { name, constraint });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect_closing_angle()?;
        }
        Ok(params)
    }

    /// `(label name: Type = default, _ name: Type, name: Type)` parameters.
    pub(crate) fn parameter_list(&mut self) -> ParseResult<Vec<Parameter>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.parameter()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    fn parameter(&mut self) -> ParseResult<Parameter> {
        let span = self.current_span();

        let (external_label, name) = if self.match_token(&TokenKind::Underscore) {
            // `_ name:`: no label at the call site
            (None, self.expect_identifier()?)
        } else {
            let first = self.expect_identifier()?;
            if let TokenKind::Identifier(second) = &self.peek().kind {
                let second = second.clone();
                self.advance();
                (Some(first), second)
            } else {
                (Some(first.clone()), first)
            }
        };

        let type_annotation = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let default_value = if self.match_token(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(Parameter {
            external_label,
            name,
            type_annotation,
            default_value,
            span,
        })
    }

    /// `class` declaration. The keyword has been consumed.
    fn class_declaration(&mut self, modifiers: Modifiers, span: Span) -> ParseResult<ClassDecl> {
        let name = self.expect_identifier()?;
        let generic_params = self.generic_params()?;
        let (superclass, conformances) = self.heritage_clause()?;

        self.expect(&TokenKind::LeftBrace)?;
        let mut properties = Vec::new();
        let mut methods = Vec::new();
        let mut initializers = Vec::new();
        let mut deinit_body = None;

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let member_span = self.current_span();
            let member_modifiers = self.parse_modifiers();
            match &self.peek().kind {
                TokenKind::Var => {
                    self.advance();
                    properties.push(self.var_decl_body(false, member_modifiers, member_span)?);
                }
                TokenKind::Let => {
                    self.advance();
                    properties.push(self.var_decl_body(true, member_modifiers, member_span)?);
                }
                TokenKind::Func => {
                    self.advance();
                    methods.push(self.func_declaration(member_modifiers, member_span)?);
                }
                TokenKind::Init => {
                    self.advance();
                    initializers.push(self.initializer_declaration(member_modifiers, member_span)?);
                }
                TokenKind::Deinit => {
                    self.advance();
                    deinit_body = Some(self.block()?);
                }
                _ => return Err(self.unexpected("class member")),
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(ClassDecl {
            name,
            generic_params,
            superclass,
            conformances,
            properties,
            methods,
            initializers,
            deinit_body,
            access: modifiers.access.unwrap_or_default(),
            span,
        })
    }

    fn initializer_declaration(
        &mut self,
        modifiers: Modifiers,
        span: Span,
    ) -> ParseResult<FuncDecl> {
        let params = self.parameter_list()?;
        let body = self.block()?;
        Ok(FuncDecl {
            name: "init".to_string(),
            generic_params: Vec::new(),
            params,
            return_type: None,
            expected_error: None,
            body,
            access: modifiers.access.unwrap_or_default(),
            is_static: false,
            is_mutating: false,
            is_override: modifiers.is_override,
            span,
        })
    }

    /// `: First, Second, …` after a type name. The first entry may be a
    /// superclass; the compiler reclassifies it as a conformance when it
    /// resolves to a protocol.
    fn heritage_clause(&mut self) -> ParseResult<(Option<String>, Vec<String>)> {
        if !self.match_token(&TokenKind::Colon) {
            return Ok((None, Vec::new()));
        }
        let first = self.expect_identifier()?;
        let mut rest = Vec::new();
        while self.match_token(&TokenKind::Comma) {
            rest.push(self.expect_identifier()?);
        }
        Ok((Some(first), rest))
    }

    /// `struct` declaration. The keyword has been consumed.
    fn struct_declaration(&mut self, modifiers: Modifiers, span: Span) -> ParseResult<StructDecl> {
        let name = self.expect_identifier()?;
        let generic_params = self.generic_params()?;
        let (first, mut conformances) = self.heritage_clause()?;
        if let Some(first) = first {
            conformances.insert(0, first);
        }

        self.expect(&TokenKind::LeftBrace)?;
        let mut properties = Vec::new();
        let mut methods = Vec::new();
        let mut initializers = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let member_span = self.current_span();
            let member_modifiers = self.parse_modifiers();
            match &self.peek().kind {
                TokenKind::Var => {
                    self.advance();
                    properties.push(self.var_decl_body(false, member_modifiers, member_span)?);
                }
                TokenKind::Let => {
                    self.advance();
                    properties.push(self.var_decl_body(true, member_modifiers, member_span)?);
                }
                TokenKind::Func => {
                    self.advance();
                    methods.push(self.func_declaration(member_modifiers, member_span)?);
                }
                TokenKind::Init => {
                    self.advance();
                    initializers.push(self.initializer_declaration(member_modifiers, member_span)?);
                }
                _ => return Err(self.unexpected("struct member")),
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(StructDecl {
            name,
            generic_params,
            conformances,
            properties,
            methods,
            initializers,
            access: modifiers.access.unwrap_or_default(),
            span,
        })
    }

    /// `enum` declaration. The keyword has been consumed.
    fn enum_declaration(&mut self, modifiers: Modifiers, span: Span) -> ParseResult<EnumDecl> {
        let name = self.expect_identifier()?;
        let raw_type = if self.match_token(&TokenKind::Colon) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        self.expect(&TokenKind::LeftBrace)?;
        let mut cases = Vec::new();
        let mut methods = Vec::new();
        let mut computed_properties = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let member_span = self.current_span();
            let member_modifiers = self.parse_modifiers();
            match &self.peek().kind {
                TokenKind::Case => {
                    self.advance();
                    loop {
                        cases.push(self.enum_case()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                TokenKind::Func => {
                    self.advance();
                    methods.push(self.func_declaration(member_modifiers, member_span)?);
                }
                TokenKind::Var => {
                    self.advance();
                    let decl = self.var_decl_body(false, member_modifiers, member_span)?;
                    if decl.accessors.is_none() {
                        return Err(ParseError::general(
                            "Enums may only contain computed properties",
                            member_span,
                        ));
                    }
                    computed_properties.push(decl);
                }
                _ => return Err(self.unexpected("enum member")),
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(EnumDecl {
            name,
            raw_type,
            cases,
            methods,
            computed_properties,
            access: modifiers.access.unwrap_or_default(),
            span,
        })
    }

    fn enum_case(&mut self) -> ParseResult<EnumCaseDecl> {
        let span = self.current_span();
        let name = self.expect_identifier()?;

        let mut raw_value = None;
        let mut associated = Vec::new();

        if self.match_token(&TokenKind::Equal) {
            raw_value = Some(self.expression()?);
        } else if self.match_token(&TokenKind::LeftParen) {
            let mut ordinal = 0usize;
            loop {
                let p_span = self.current_span();
                // `label: Type` or a bare `Type`
                let label = if matches!(self.peek().kind, TokenKind::Identifier(_))
                    && self.peek_nth(1).kind == TokenKind::Colon
                {
                    let label = self.expect_identifier()?;
                    self.advance();
                    Some(label)
                } else {
                    None
                };
                let ty = self.parse_type_annotation()?;
                let name = label
                    .clone()
                    .unwrap_or_else(|| format!("_{}", ordinal));
                associated.push(Parameter {
                    external_label: label,
                    name,
                    type_annotation: Some(ty),
                    default_value: None,
                    span: p_span,
                });
                ordinal += 1;
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightParen)?;
        }

        Ok(EnumCaseDecl {
            name,
            raw_value,
            associated,
            span,
        })
    }

    /// `protocol` declaration. The keyword has been consumed.
    fn protocol_declaration(&mut self, span: Span) -> ParseResult<ProtocolDecl> {
        let name = self.expect_identifier()?;
        let (first, mut inherited) = self.heritage_clause()?;
        if let Some(first) = first {
            inherited.insert(0, first);
        }

        self.expect(&TokenKind::LeftBrace)?;
        let mut methods = Vec::new();
        let mut properties = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let member_span = self.current_span();
            let is_mutating = self.match_token(&TokenKind::Mutating);
            match &self.peek().kind {
                TokenKind::Func => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    let params = self.parameter_list()?;
                    if self.match_token(&TokenKind::Arrow) {
                        self.parse_type_annotation()?;
                    }
                    methods.push(ProtocolMethodReq {
                        name,
                        param_names: params.into_iter().map(|p| p.name).collect(),
                        is_mutating,
                        span: member_span,
                    });
                }
                TokenKind::Var => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    self.expect(&TokenKind::Colon)?;
                    self.parse_type_annotation()?;
                    let (has_getter, has_setter) = self.accessor_requirements()?;
                    properties.push(ProtocolPropertyReq {
                        name,
                        has_getter,
                        has_setter,
                        span: member_span,
                    });
                }
                _ => return Err(self.unexpected("protocol requirement")),
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(ProtocolDecl {
            name,
            inherited,
            methods,
            properties,
            span,
        })
    }

    /// `{ get }` / `{ get set }` on a protocol property requirement.
    fn accessor_requirements(&mut self) -> ParseResult<(bool, bool)> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut has_getter = false;
        let mut has_setter = false;
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let name = self.expect_identifier()?;
            match name.as_str() {
                "get" => has_getter = true,
                "set" => has_setter = true,
                other => {
                    return Err(ParseError::general(
                        format!("Expected get or set, found '{}'", other),
                        self.previous_span(),
                    ))
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok((has_getter, has_setter))
    }

    /// `extension` declaration. The keyword has been consumed.
    fn extension_declaration(&mut self, span: Span) -> ParseResult<ExtensionDecl> {
        let type_name = self.expect_identifier()?;
        let (first, mut conformances) = self.heritage_clause()?;
        if let Some(first) = first {
            conformances.insert(0, first);
        }

        self.expect(&TokenKind::LeftBrace)?;
        let mut methods = Vec::new();
        let mut computed_properties = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let member_span = self.current_span();
            let member_modifiers = self.parse_modifiers();
            match &self.peek().kind {
                TokenKind::Func => {
                    self.advance();
                    methods.push(self.func_declaration(member_modifiers, member_span)?);
                }
                TokenKind::Var => {
                    self.advance();
                    let decl = self.var_decl_body(false, member_modifiers, member_span)?;
                    if decl.accessors.is_none() {
                        return Err(ParseError::general(
                            "Extensions may only add computed properties",
                            member_span,
                        ));
                    }
                    computed_properties.push(decl);
                }
                _ => return Err(self.unexpected("extension member")),
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(ExtensionDecl {
            type_name,
            conformances,
            methods,
            computed_properties,
            span,
        })
    }
}
