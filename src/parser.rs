//! Hand-written recursive-descent parser for QubecTalk (spec.md §4.A).
//! Diagnostics accumulate in a `Vec<CompileError>` instead of stopping at the
//! first mistake, with simple panic-mode recovery so one bad statement
//! doesn't swallow every other error in the file.

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::{Keyword, Lexer, Span, Token, TokenKind};
use crate::types::StreamId;

pub fn parse(source: &str) -> Result<ProgramAst, Vec<CompileError>> {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            return Err(vec![CompileError::new(
                e.span.line,
                e.span.column,
                e.message,
            )])
        }
    };
    let mut parser = Parser {
        tokens,
        pos: 0,
        errors: Vec::new(),
    };
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<CompileError>,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let span = self.span();
        self.errors
            .push(CompileError::new(span.line, span.column, message.into()));
    }

    fn expect_keyword(&mut self, kw: Keyword) -> PResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.error(format!(
                "expected `{:?}`, found `{}`",
                kw,
                self.peek().lexeme
            ));
            Err(())
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<()> {
        if *self.peek_kind() == kind {
            self.advance();
            Ok(())
        } else {
            self.error(format!("expected {}, found `{}`", what, self.peek().lexeme));
            Err(())
        }
    }

    fn expect_string(&mut self) -> PResult<String> {
        if let TokenKind::String(s) = self.peek_kind().clone() {
            self.advance();
            Ok(s)
        } else {
            self.error(format!("expected a quoted name, found `{}`", self.peek().lexeme));
            Err(())
        }
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        if let TokenKind::Identifier(s) = self.peek_kind().clone() {
            self.advance();
            Ok(s)
        } else {
            self.error(format!("expected an identifier, found `{}`", self.peek().lexeme));
            Err(())
        }
    }

    /// Skips tokens (tracking brace depth) until the next stanza-starting
    /// keyword at depth zero, or EOF. Used to resynchronize after a stanza
    /// fails to parse.
    fn recover_to_stanza_boundary(&mut self) {
        let mut depth: i32 = 0;
        while !self.is_eof() {
            match self.peek_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::Keyword(Keyword::About)
                | TokenKind::Keyword(Keyword::Default)
                | TokenKind::Keyword(Keyword::Policy)
                | TokenKind::Keyword(Keyword::Simulations)
                    if depth <= 0 =>
                {
                    return
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Skips to the next `}` at the current nesting depth, consuming it.
    /// Used to resynchronize after a single statement fails to parse.
    fn recover_to_block_end(&mut self) {
        let mut depth: i32 = 0;
        while !self.is_eof() {
            match self.peek_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_balanced_block(&mut self) {
        // Called with the cursor on the opening `{`.
        let mut depth: i32 = 0;
        loop {
            match self.peek_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- top level ----

    fn parse_program(&mut self) -> ProgramAst {
        let mut program = ProgramAst::default();
        while !self.is_eof() {
            if self.at_keyword(Keyword::About) {
                self.advance();
                if self.expect(TokenKind::LBrace, "`{`").is_ok() {
                    self.skip_balanced_block();
                }
                program.about_present = true;
            } else if self.at_keyword(Keyword::Default) {
                self.advance();
                match self.parse_default_body() {
                    Ok(default) => program.default = Some(default),
                    Err(()) => self.recover_to_stanza_boundary(),
                }
            } else if self.at_keyword(Keyword::Policy) {
                self.advance();
                match self.parse_policy_body() {
                    Ok(policy) => program.policies.push(policy),
                    Err(()) => self.recover_to_stanza_boundary(),
                }
            } else if self.at_keyword(Keyword::Simulations) {
                self.advance();
                match self.parse_simulations_body() {
                    Ok(sims) => program.simulations = Some(sims),
                    Err(()) => self.recover_to_stanza_boundary(),
                }
            } else {
                self.error(format!(
                    "expected a stanza (`about`, `default`, `policy`, `simulations`), found `{}`",
                    self.peek().lexeme
                ));
                self.recover_to_stanza_boundary();
            }
        }
        program
    }

    fn parse_default_body(&mut self) -> PResult<Default> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut applications = Vec::new();
        while self.eat_keyword(Keyword::Define) {
            match self.parse_application_def(Keyword::Uses) {
                Ok(app) => applications.push(app),
                Err(()) => self.recover_to_block_end(),
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Default { applications })
    }

    fn parse_policy_body(&mut self) -> PResult<Policy> {
        let name = self.expect_string()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut applications = Vec::new();
        while self.eat_keyword(Keyword::Modify) {
            match self.parse_application_def(Keyword::Modify) {
                Ok(app) => applications.push(app),
                Err(()) => self.recover_to_block_end(),
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Policy { name, applications })
    }

    fn at_rbrace(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::RBrace)
    }

    fn parse_application_def(&mut self, substance_intro: Keyword) -> PResult<ApplicationDef> {
        self.expect_keyword(Keyword::Application)?;
        let name = self.expect_string()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut substances = Vec::new();
        while self.at_keyword(substance_intro) {
            self.advance();
            match self.parse_substance_def() {
                Ok(s) => substances.push(s),
                Err(()) => self.recover_to_block_end(),
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(ApplicationDef { name, substances })
    }

    fn parse_substance_def(&mut self) -> PResult<SubstanceDef> {
        self.expect_keyword(Keyword::Substance)?;
        let name = self.expect_string()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while !self.at_rbrace() && !self.is_eof() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.recover_to_block_end(),
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(SubstanceDef { name, statements })
    }

    fn parse_simulations_body(&mut self) -> PResult<Simulations> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut items = Vec::new();
        while self.at_keyword(Keyword::Simulate) {
            match self.parse_simulation_item() {
                Ok(item) => items.push(item),
                Err(()) => self.recover_to_block_end(),
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Simulations { items })
    }

    fn parse_simulation_item(&mut self) -> PResult<SimulationItem> {
        self.expect_keyword(Keyword::Simulate)?;
        let name = self.expect_string()?;
        let mut stanzas = vec!["default".to_string()];
        if self.eat_keyword(Keyword::Using) {
            loop {
                stanzas.push(self.expect_string()?);
                if matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_keyword(Keyword::From)?;
        self.expect_keyword(Keyword::Years)?;
        let start_year = self.parse_expr()?;
        self.expect_keyword(Keyword::To)?;
        let end_year = self.parse_expr()?;
        let trials = if self.eat_keyword(Keyword::Trials) {
            self.parse_expr()?
        } else {
            Expr::Number(1.0)
        };
        Ok(SimulationItem {
            name,
            stanzas,
            start_year,
            end_year,
            trials,
        })
    }

    // ---- statements ----

    fn parse_year_clause(&mut self) -> PResult<YearClause> {
        if !self.eat_keyword(Keyword::During) {
            return Ok(YearClause::All);
        }
        if matches!(self.peek_kind(), TokenKind::Identifier(s) if s == "all") {
            self.advance();
            self.expect_keyword(Keyword::Years)?;
            return Ok(YearClause::All);
        }
        if self.eat_keyword(Keyword::Year) {
            if self.eat_keyword(Keyword::Beginning) {
                return Ok(YearClause::OnStart);
            }
            let year = self.parse_expr()?;
            return Ok(YearClause::SingleYear(year));
        }
        self.expect_keyword(Keyword::Years)?;
        if self.eat_keyword(Keyword::Beginning) {
            self.expect_keyword(Keyword::To)?;
            let hi = self.parse_expr()?;
            return Ok(YearClause::WithMax(hi));
        }
        let lo = self.parse_expr()?;
        self.expect_keyword(Keyword::To)?;
        if self.eat_keyword(Keyword::Onwards) {
            return Ok(YearClause::WithMin(lo));
        }
        let hi = self.parse_expr()?;
        Ok(YearClause::Range(lo, hi))
    }

    fn parse_stream_id(&mut self) -> PResult<StreamId> {
        let kw = match self.peek_kind().clone() {
            TokenKind::Keyword(k) => k,
            _ => {
                self.error(format!("expected a stream name, found `{}`", self.peek().lexeme));
                return Err(());
            }
        };
        let stream = match kw {
            Keyword::Manufacture => StreamId::Manufacture,
            Keyword::Import | Keyword::Export => StreamId::Import,
            Keyword::Sales => StreamId::Sales,
            Keyword::Recycle => StreamId::Recycle,
            Keyword::Consumption => StreamId::Consumption,
            Keyword::RechargeEmissions => StreamId::RechargeEmissions,
            Keyword::EolEmissions => StreamId::EolEmissions,
            Keyword::Equipment => StreamId::Equipment,
            Keyword::PriorEquipment => StreamId::PriorEquipment,
            Keyword::NewEquipment => StreamId::NewEquipment,
            Keyword::Energy => StreamId::Energy,
            _ => {
                self.error(format!("expected a stream name, found `{}`", self.peek().lexeme));
                return Err(());
            }
        };
        self.advance();
        Ok(stream)
    }

    fn parse_statement(&mut self) -> PResult<Statement> {
        if self.eat_keyword(Keyword::Define) {
            let name = self.expect_identifier()?;
            self.expect_keyword(Keyword::As)?;
            let expr = self.parse_expr()?;
            return Ok(Statement::DefineVar(name, expr));
        }
        if self.eat_keyword(Keyword::Equals) {
            let expr = self.parse_expr()?;
            return Ok(Statement::Equals(expr));
        }
        if self.at_keyword(Keyword::Uses) {
            self.advance();
            let expr = self.parse_expr()?;
            return Ok(Statement::UsesEnergy(expr));
        }
        if self.eat_keyword(Keyword::Set) {
            if self.eat_keyword(Keyword::Initial) {
                self.expect_keyword(Keyword::Charge)?;
                self.expect_keyword(Keyword::To)?;
                let value = self.parse_expr()?;
                self.expect_keyword(Keyword::For)?;
                let stream = self.parse_stream_id()?;
                let years = self.parse_year_clause()?;
                return Ok(Statement::InitialCharge {
                    stream,
                    value,
                    years,
                });
            }
            let target = self.parse_stream_id()?;
            self.expect_keyword(Keyword::To)?;
            let value = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::SetStream {
                target,
                value,
                years,
            });
        }
        if self.eat_keyword(Keyword::Change) {
            let target = self.parse_stream_id()?;
            self.expect_keyword(Keyword::By)?;
            let delta = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::ChangeStream {
                target,
                delta,
                years,
            });
        }
        if self.eat_keyword(Keyword::Cap) {
            let target = self.parse_stream_id()?;
            self.expect_keyword(Keyword::To)?;
            let limit = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::CapStream {
                target,
                limit,
                years,
            });
        }
        if self.eat_keyword(Keyword::Floor) {
            let target = self.parse_stream_id()?;
            self.expect_keyword(Keyword::To)?;
            let limit = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::FloorStream {
                target,
                limit,
                years,
            });
        }
        if self.eat_keyword(Keyword::Recharge) {
            let population_pct = self.parse_expr()?;
            self.expect_keyword(Keyword::With)?;
            let volume_per_unit = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::Recharge {
                population_pct,
                volume_per_unit,
                years,
            });
        }
        if self.eat_keyword(Keyword::Retire) {
            let pct_per_year = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::Retire {
                pct_per_year,
                years,
            });
        }
        if self.eat_keyword(Keyword::Recover) {
            let volume = self.parse_expr()?;
            self.expect_keyword(Keyword::With)?;
            let yield_pct = self.parse_expr()?;
            self.expect_keyword(Keyword::Reuse)?;
            let displacement = if self.eat_keyword(Keyword::Displacing) {
                let percent = self.parse_expr()?;
                let target = match self.parse_stream_id()? {
                    StreamId::Manufacture => DisplacementTarget::Manufacture,
                    StreamId::Import => DisplacementTarget::Import,
                    _ => {
                        self.error("displacement target must be `manufacture` or `import`");
                        return Err(());
                    }
                };
                Some(Displacement { target, percent })
            } else {
                None
            };
            let years = self.parse_year_clause()?;
            return Ok(Statement::Recycle {
                volume,
                yield_pct,
                displacement,
                years,
            });
        }
        if self.eat_keyword(Keyword::Replace) {
            let volume = self.parse_expr()?;
            let stream = self.parse_stream_id()?;
            self.expect_keyword(Keyword::With)?;
            let destination_substance = self.expect_string()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::Replace {
                volume,
                stream,
                destination_substance,
                years,
            });
        }
        if self.eat_keyword(Keyword::Emit) {
            let value = self.parse_expr()?;
            let years = self.parse_year_clause()?;
            return Ok(Statement::Emit { value, years });
        }
        self.error(format!(
            "expected a statement, found `{}`",
            self.peek().lexeme
        ));
        Err(())
    }

    // ---- expressions ----

    fn unit_atom_text(kw: Keyword) -> Option<&'static str> {
        Some(match kw {
            Keyword::Kg => "kg",
            Keyword::Mt => "mt",
            Keyword::Unit => "unit",
            Keyword::Units => "units",
            Keyword::TCo2e => "tCO2e",
            Keyword::Kwh => "kwh",
            Keyword::Year => "year",
            Keyword::Years => "years",
            Keyword::Percent => "%",
            _ => return None,
        })
    }

    fn try_parse_unit_suffix(&mut self) -> Option<String> {
        let numerator = match self.peek_kind() {
            TokenKind::Keyword(k) => Self::unit_atom_text(*k)?,
            _ => return None,
        };
        self.advance();
        if matches!(self.peek_kind(), TokenKind::Slash) {
            let checkpoint = self.pos;
            self.advance();
            if let TokenKind::Keyword(k) = self.peek_kind() {
                if let Some(denominator) = Self::unit_atom_text(*k) {
                    self.advance();
                    return Some(format!("{} / {}", numerator, denominator));
                }
            }
            self.pos = checkpoint;
        }
        Some(numerator.to_string())
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        if self.eat_keyword(Keyword::If) {
            let cond = self.parse_comparison()?;
            self.expect_keyword(Keyword::Then)?;
            let then_branch = self.parse_expr()?;
            let else_branch = if self.eat_keyword(Keyword::Else) {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            self.expect_keyword(Keyword::Endif)?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then_branch),
                else_branch,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::Neq,
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::Lte => CompareOp::Lte,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::Gte => CompareOp::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_unary()?;
        if matches!(self.peek_kind(), TokenKind::Caret) {
            self.advance();
            let exponent = self.parse_power()?; // right-associative
            return Ok(Expr::Arith(ArithOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if matches!(self.peek_kind(), TokenKind::Minus) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Arith(
                ArithOp::Sub,
                Box::new(Expr::Number(0.0)),
                Box::new(inner),
            ));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        if self.eat_keyword(Keyword::Limit) {
            return self.parse_limit();
        }
        if self.eat_keyword(Keyword::Sample) {
            return self.parse_sample();
        }
        if self.eat_keyword(Keyword::Get) {
            return self.parse_get_stream();
        }
        if matches!(self.peek_kind(), TokenKind::LParen) {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(TokenKind::RParen, "`)`")?;
            return Ok(inner);
        }
        if let TokenKind::Number(v) = *self.peek_kind() {
            self.advance();
            if let Some(unit) = self.try_parse_unit_suffix() {
                return Ok(Expr::UnitValue(Box::new(Expr::Number(v)), unit));
            }
            return Ok(Expr::Number(v));
        }
        if let TokenKind::String(s) = self.peek_kind().clone() {
            self.advance();
            return Ok(Expr::String(s));
        }
        if let TokenKind::Identifier(name) = self.peek_kind().clone() {
            self.advance();
            return Ok(Expr::Identifier(name));
        }
        self.error(format!(
            "expected an expression, found `{}`",
            self.peek().lexeme
        ));
        Err(())
    }

    fn parse_limit(&mut self) -> PResult<Expr> {
        let value = self.parse_additive()?;
        let mut min_bound = None;
        let mut max_bound = None;
        loop {
            match self.peek_kind() {
                TokenKind::Identifier(s) if s == "min" => {
                    self.advance();
                    min_bound = Some(self.parse_additive()?);
                }
                TokenKind::Identifier(s) if s == "max" => {
                    self.advance();
                    max_bound = Some(self.parse_additive()?);
                }
                _ => break,
            }
        }
        match (min_bound, max_bound) {
            (Some(lo), Some(hi)) => Ok(Expr::LimitBound(Box::new(value), Box::new(lo), Box::new(hi))),
            (Some(lo), None) => Ok(Expr::LimitMin(Box::new(value), Box::new(lo))),
            (None, Some(hi)) => Ok(Expr::LimitMax(Box::new(value), Box::new(hi))),
            (None, None) => {
                self.error("`limit` requires at least one of `min <expr>` / `max <expr>`");
                Err(())
            }
        }
    }

    fn parse_sample(&mut self) -> PResult<Expr> {
        if self.eat_keyword(Keyword::Normally) {
            self.expect_keyword(Keyword::From)?;
            self.expect_keyword(Keyword::Mean)?;
            self.expect_keyword(Keyword::Of)?;
            let mean = self.parse_additive()?;
            self.expect_keyword(Keyword::Std)?;
            self.expect_keyword(Keyword::Of)?;
            let std = self.parse_additive()?;
            return Ok(Expr::SampleNormal {
                mean: Box::new(mean),
                std: Box::new(std),
            });
        }
        if self.eat_keyword(Keyword::Uniformly) {
            self.expect_keyword(Keyword::From)?;
            let low = self.parse_additive()?;
            self.expect_keyword(Keyword::To)?;
            let high = self.parse_additive()?;
            return Ok(Expr::SampleUniform {
                low: Box::new(low),
                high: Box::new(high),
            });
        }
        self.error("expected `normally` or `uniformly` after `sample`");
        Err(())
    }

    fn parse_get_stream(&mut self) -> PResult<Expr> {
        let target = self.parse_stream_id()?;
        let rescope = if self.eat_keyword(Keyword::For) {
            let application = Some(self.expect_string()?);
            self.expect_keyword(Keyword::Of)?;
            let substance = Some(self.expect_string()?);
            Some(Rescope {
                application,
                substance,
            })
        } else {
            None
        };
        let conversion = if self.eat_keyword(Keyword::As) {
            self.try_parse_unit_suffix().or_else(|| {
                self.error("expected a unit after `as`");
                None
            })
        } else {
            None
        };
        Ok(Expr::GetStream {
            target,
            rescope,
            conversion,
        })
    }
}
