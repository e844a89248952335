use super::{
    ast::{
        BinaryOp, Clause, Expr, Literal, NodePattern, PathPattern, Projection, ProjectionItem,
        Query, RelPattern, SetItem, SortItem, UnaryOp,
    },
    lexer::{Token, TokenKind, tokenize},
};
use crate::{errors::CypherError, graph::Direction};

/// Clause keywords recognised but not executed.
const UNSUPPORTED_CLAUSES: &[&str] = &["MERGE", "REMOVE", "CALL", "UNION", "FOREACH", "LOAD"];

/// Parses a single Cypher statement. One trailing `;` is accepted.
pub fn parse(src: &str) -> Result<Query, CypherError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    parser.query()
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn query(&mut self) -> Result<Query, CypherError> {
        let mut clauses = Vec::new();
        while !self.at_end() {
            if self.check(&TokenKind::Semicolon) {
                self.pos += 1;
                if !self.at_end() {
                    return Err(self.error("expected a single statement"));
                }
                break;
            }
            clauses.push(self.clause()?);
        }
        let Some(last) = clauses.last() else {
            return Err(self.error("empty query"));
        };
        for (idx, clause) in clauses.iter().enumerate() {
            if matches!(clause, Clause::Return(_)) && idx + 1 != clauses.len() {
                return Err(self.error("RETURN must be the final clause"));
            }
        }
        if matches!(
            last,
            Clause::Match { .. } | Clause::With { .. } | Clause::Unwind { .. }
        ) {
            return Err(self.error("query cannot conclude with a reading clause; add RETURN"));
        }
        Ok(Query { clauses })
    }

    fn clause(&mut self) -> Result<Clause, CypherError> {
        let token = self.current()?.clone();
        if self.eat_keyword("MATCH") {
            return self.match_clause(false);
        }
        if self.eat_keyword("OPTIONAL") {
            self.expect_keyword("MATCH")?;
            return self.match_clause(true);
        }
        if self.eat_keyword("UNWIND") {
            let expr = self.expr()?;
            self.expect_keyword("AS")?;
            let alias = self.name()?;
            return Ok(Clause::Unwind { expr, alias });
        }
        if self.eat_keyword("WITH") {
            let projection = self.projection()?;
            let predicate = self.where_clause()?;
            return Ok(Clause::With {
                projection,
                predicate,
            });
        }
        if self.eat_keyword("RETURN") {
            return Ok(Clause::Return(self.projection()?));
        }
        if self.eat_keyword("CREATE") {
            return Ok(Clause::Create(self.patterns()?));
        }
        if self.eat_keyword("SET") {
            let mut items = vec![self.set_item()?];
            while self.eat(&TokenKind::Comma) {
                items.push(self.set_item()?);
            }
            return Ok(Clause::Set(items));
        }
        if self.eat_keyword("DETACH") {
            self.expect_keyword("DELETE")?;
            return self.delete_clause(true);
        }
        if self.eat_keyword("DELETE") {
            return self.delete_clause(false);
        }
        if let Some(word) = UNSUPPORTED_CLAUSES
            .iter()
            .find(|word| token.is_keyword(word))
        {
            return Err(CypherError::unsupported(format!("{word} clause")));
        }
        Err(CypherError::syntax(
            format!("expected a clause, found `{}`", self.text(&token)),
            token.start,
        ))
    }

    fn match_clause(&mut self, optional: bool) -> Result<Clause, CypherError> {
        let patterns = self.patterns()?;
        let predicate = self.where_clause()?;
        Ok(Clause::Match {
            optional,
            patterns,
            predicate,
        })
    }

    fn where_clause(&mut self) -> Result<Option<Expr>, CypherError> {
        if self.eat_keyword("WHERE") {
            Ok(Some(self.expr()?))
        } else {
            Ok(None)
        }
    }

    fn delete_clause(&mut self, detach: bool) -> Result<Clause, CypherError> {
        let mut targets = vec![self.expr()?];
        while self.eat(&TokenKind::Comma) {
            targets.push(self.expr()?);
        }
        Ok(Clause::Delete { detach, targets })
    }

    fn set_item(&mut self) -> Result<SetItem, CypherError> {
        let var = self.name()?;
        if self.eat(&TokenKind::Dot) {
            let key = self.name()?;
            self.expect(&TokenKind::Eq, "`=`")?;
            let value = self.expr()?;
            return Ok(SetItem::Property { var, key, value });
        }
        if self.check(&TokenKind::Colon) {
            let labels = self.labels()?;
            return Ok(SetItem::Labels { var, labels });
        }
        if self.check(&TokenKind::Eq) || self.check(&TokenKind::PlusEq) {
            return Err(CypherError::unsupported("whole-entity property assignment"));
        }
        Err(self.error("expected `.property = value` or `:Label` in SET"))
    }

    fn projection(&mut self) -> Result<Projection, CypherError> {
        let distinct = self.eat_keyword("DISTINCT");
        let mut star = false;
        let mut items = Vec::new();
        if self.eat(&TokenKind::Star) {
            star = true;
            while self.eat(&TokenKind::Comma) {
                items.push(self.projection_item()?);
            }
        } else {
            items.push(self.projection_item()?);
            while self.eat(&TokenKind::Comma) {
                items.push(self.projection_item()?);
            }
        }
        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.expr()?;
                let descending = if self.eat_keyword("DESC") || self.eat_keyword("DESCENDING") {
                    true
                } else {
                    let _ = self.eat_keyword("ASC") || self.eat_keyword("ASCENDING");
                    false
                };
                order_by.push(SortItem { expr, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let skip = if self.eat_keyword("SKIP") {
            Some(self.expr()?)
        } else {
            None
        };
        let limit = if self.eat_keyword("LIMIT") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Projection {
            distinct,
            star,
            items,
            order_by,
            skip,
            limit,
        })
    }

    fn projection_item(&mut self) -> Result<ProjectionItem, CypherError> {
        let start = self.current()?.start;
        let expr = self.expr()?;
        let end = self.tokens[self.pos - 1].end;
        let name = if self.eat_keyword("AS") {
            self.name()?
        } else {
            self.src[start..end].trim().to_string()
        };
        Ok(ProjectionItem { expr, name })
    }

    fn patterns(&mut self) -> Result<Vec<PathPattern>, CypherError> {
        let mut patterns = vec![self.path()?];
        while self.eat(&TokenKind::Comma) {
            patterns.push(self.path()?);
        }
        Ok(patterns)
    }

    fn path(&mut self) -> Result<PathPattern, CypherError> {
        if self.peek_ident().is_some() && self.peek_kind(1) == Some(&TokenKind::Eq) {
            return Err(CypherError::unsupported("named paths"));
        }
        let start = self.node_pattern()?;
        let mut steps = Vec::new();
        while self.check(&TokenKind::Minus) || self.check(&TokenKind::Lt) {
            let rel = self.rel_pattern()?;
            let node = self.node_pattern()?;
            steps.push((rel, node));
        }
        Ok(PathPattern { start, steps })
    }

    fn node_pattern(&mut self) -> Result<NodePattern, CypherError> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let var = if self.peek_ident().is_some() {
            Some(self.name()?)
        } else {
            None
        };
        let labels = if self.check(&TokenKind::Colon) {
            self.labels()?
        } else {
            Vec::new()
        };
        let properties = if self.check(&TokenKind::LBrace) {
            self.map_entries()?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(NodePattern {
            var,
            labels,
            properties,
        })
    }

    fn rel_pattern(&mut self) -> Result<RelPattern, CypherError> {
        let left_arrow = self.eat(&TokenKind::Lt);
        self.expect(&TokenKind::Minus, "`-`")?;
        let mut var = None;
        let mut types = Vec::new();
        let mut properties = Vec::new();
        if self.eat(&TokenKind::LBracket) {
            if self.peek_ident().is_some() {
                var = Some(self.name()?);
            }
            if self.eat(&TokenKind::Colon) {
                types.push(self.name()?);
                while self.eat(&TokenKind::Pipe) {
                    let _ = self.eat(&TokenKind::Colon);
                    types.push(self.name()?);
                }
            }
            if self.check(&TokenKind::Star) {
                return Err(CypherError::unsupported("variable-length relationships"));
            }
            if self.check(&TokenKind::LBrace) {
                properties = self.map_entries()?;
            }
            self.expect(&TokenKind::RBracket, "`]`")?;
        }
        self.expect(&TokenKind::Minus, "`-`")?;
        let right_arrow = self.eat(&TokenKind::Gt);
        let direction = match (left_arrow, right_arrow) {
            (false, true) => Direction::Outgoing,
            (true, false) => Direction::Incoming,
            (false, false) => Direction::Both,
            (true, true) => return Err(self.error("relationship cannot point both ways")),
        };
        Ok(RelPattern {
            var,
            types,
            properties,
            direction,
        })
    }

    fn labels(&mut self) -> Result<Vec<String>, CypherError> {
        let mut labels = Vec::new();
        while self.eat(&TokenKind::Colon) {
            labels.push(self.name()?);
        }
        Ok(labels)
    }

    fn map_entries(&mut self) -> Result<Vec<(String, Expr)>, CypherError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(entries);
        }
        loop {
            let key = match self.current()?.kind.clone() {
                TokenKind::Str(key) => {
                    self.pos += 1;
                    key
                }
                _ => self.name()?,
            };
            self.expect(&TokenKind::Colon, "`:`")?;
            entries.push((key, self.expr()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(entries)
    }

    fn expr(&mut self) -> Result<Expr, CypherError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, CypherError> {
        let mut lhs = self.xor_expr()?;
        while self.eat_keyword("OR") {
            let rhs = self.xor_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn xor_expr(&mut self) -> Result<Expr, CypherError> {
        let mut lhs = self.and_expr()?;
        while self.eat_keyword("XOR") {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinaryOp::Xor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, CypherError> {
        let mut lhs = self.not_expr()?;
        while self.eat_keyword("AND") {
            let rhs = self.not_expr()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, CypherError> {
        if self.eat_keyword("NOT") {
            let inner = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CypherError> {
        let mut lhs = self.additive()?;
        loop {
            let symbol = match self.peek_kind(0) {
                Some(TokenKind::Eq) => Some(BinaryOp::Eq),
                Some(TokenKind::Neq) => Some(BinaryOp::Neq),
                Some(TokenKind::Lt) => Some(BinaryOp::Lt),
                Some(TokenKind::Le) => Some(BinaryOp::Le),
                Some(TokenKind::Gt) => Some(BinaryOp::Gt),
                Some(TokenKind::Ge) => Some(BinaryOp::Ge),
                Some(TokenKind::RegexMatch) => Some(BinaryOp::RegexMatch),
                _ => None,
            };
            let op = if let Some(op) = symbol {
                self.pos += 1;
                op
            } else if self.eat_keyword("IN") {
                BinaryOp::In
            } else if self.eat_keyword("CONTAINS") {
                BinaryOp::Contains
            } else if self.keyword_pair("STARTS", "WITH") {
                BinaryOp::StartsWith
            } else if self.keyword_pair("ENDS", "WITH") {
                BinaryOp::EndsWith
            } else if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                self.expect_keyword("NULL")?;
                lhs = Expr::IsNull {
                    expr: Box::new(lhs),
                    negated,
                };
                continue;
            } else {
                return Ok(lhs);
            };
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr, CypherError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind(0) {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CypherError> {
        let mut lhs = self.power()?;
        loop {
            let op = match self.peek_kind(0) {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.power()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn power(&mut self) -> Result<Expr, CypherError> {
        let lhs = self.unary()?;
        if self.eat(&TokenKind::Caret) {
            let rhs = self.power()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CypherError> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.unary()?;
            return Ok(match inner {
                Expr::Literal(Literal::Int(v)) => Expr::Literal(Literal::Int(-v)),
                Expr::Literal(Literal::Float(v)) => Expr::Literal(Literal::Float(-v)),
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CypherError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let key = self.name()?;
                expr = Expr::Property(Box::new(expr), key);
            } else if self.check(&TokenKind::LBracket) {
                self.pos += 1;
                if self.check(&TokenKind::DotDot) {
                    return Err(CypherError::unsupported("list slicing"));
                }
                let index = self.expr()?;
                if self.check(&TokenKind::DotDot) {
                    return Err(CypherError::unsupported("list slicing"));
                }
                self.expect(&TokenKind::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.check(&TokenKind::Colon) && matches!(expr, Expr::Variable(_)) {
                let labels = self.labels()?;
                expr = Expr::HasLabels(Box::new(expr), labels);
            } else {
                return Ok(expr);
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, CypherError> {
        let token = self.current()?.clone();
        match &token.kind {
            TokenKind::Int(v) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Int(*v)))
            }
            TokenKind::Float(v) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Float(*v)))
            }
            TokenKind::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Literal::Str(s.clone())))
            }
            TokenKind::Dollar => Err(CypherError::unsupported("query parameters")),
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBracket, "`]`")?;
                }
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => Ok(Expr::Map(self.map_entries()?)),
            TokenKind::Ident { name, quoted } => {
                let name = name.clone();
                if !quoted {
                    if token.is_keyword("NULL") {
                        self.pos += 1;
                        return Ok(Expr::Literal(Literal::Null));
                    }
                    if token.is_keyword("TRUE") {
                        self.pos += 1;
                        return Ok(Expr::Literal(Literal::Bool(true)));
                    }
                    if token.is_keyword("FALSE") {
                        self.pos += 1;
                        return Ok(Expr::Literal(Literal::Bool(false)));
                    }
                    if token.is_keyword("CASE") {
                        self.pos += 1;
                        return self.case_expr();
                    }
                    if token.is_keyword("EXISTS") && self.peek_kind(1) == Some(&TokenKind::LBrace) {
                        return Err(CypherError::unsupported("existential subqueries"));
                    }
                }
                self.pos += 1;
                if !quoted && self.check(&TokenKind::LParen) {
                    return self.call(name);
                }
                Ok(Expr::Variable(name))
            }
            _ => Err(CypherError::syntax(
                format!("unexpected `{}` in expression", self.text(&token)),
                token.start,
            )),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, CypherError> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let name = name.to_ascii_lowercase();
        if name == "count" && self.check(&TokenKind::Star) {
            self.pos += 1;
            self.expect(&TokenKind::RParen, "`)`")?;
            return Ok(Expr::CountStar);
        }
        let distinct = self.eat_keyword("DISTINCT");
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "`)`")?;
        }
        Ok(Expr::Call {
            name,
            distinct,
            args,
        })
    }

    fn case_expr(&mut self) -> Result<Expr, CypherError> {
        let operand = if self.check_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let mut branches = Vec::new();
        while self.eat_keyword("WHEN") {
            let when = self.expr()?;
            self.expect_keyword("THEN")?;
            let then = self.expr()?;
            branches.push((when, then));
        }
        if branches.is_empty() {
            return Err(self.error("CASE requires at least one WHEN"));
        }
        let otherwise = if self.eat_keyword("ELSE") {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expr::Case {
            operand,
            branches,
            otherwise,
        })
    }

    fn name(&mut self) -> Result<String, CypherError> {
        match self.peek_ident() {
            Some(name) => {
                let name = name.to_string();
                self.pos += 1;
                Ok(name)
            }
            None => Err(self.error("expected an identifier")),
        }
    }

    fn peek_ident(&self) -> Option<&str> {
        self.tokens.get(self.pos).and_then(Token::ident)
    }

    fn peek_kind(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| &t.kind)
    }

    fn current(&self) -> Result<&Token, CypherError> {
        self.tokens
            .get(self.pos)
            .ok_or_else(|| CypherError::syntax("unexpected end of query", self.src.len()))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind(0) == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), CypherError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn check_keyword(&self, word: &str) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|t| t.is_keyword(word))
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.check_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn keyword_pair(&mut self, first: &str, second: &str) -> bool {
        let second_matches = self
            .tokens
            .get(self.pos + 1)
            .is_some_and(|t| t.is_keyword(second));
        if self.check_keyword(first) && second_matches {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), CypherError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {word}")))
        }
    }

    fn text(&self, token: &Token) -> &str {
        &self.src[token.start..token.end]
    }

    fn error(&self, message: &str) -> CypherError {
        match self.tokens.get(self.pos) {
            Some(token) => CypherError::syntax(
                format!("{message}, found `{}`", self.text(token)),
                token.start,
            ),
            None => CypherError::syntax(format!("{message} at end of query"), self.src.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_match_return_with_alias_names() {
        let query = parse("MATCH (c:Contract)-[:HAS_CLAUSE]->(k) RETURN c.name, count(k) AS n")
            .expect("parse");
        assert_eq!(query.clauses.len(), 2);
        let Clause::Return(projection) = &query.clauses[1] else {
            panic!("expected RETURN");
        };
        let names: Vec<_> = projection.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["c.name", "n"]);
    }

    #[test]
    fn relationship_directions() {
        let query = parse("MATCH (a)<-[r:X|Y]-(b)--(c) RETURN a").expect("parse");
        let Clause::Match { patterns, .. } = &query.clauses[0] else {
            panic!("expected MATCH");
        };
        assert_eq!(patterns[0].steps[0].0.direction, Direction::Incoming);
        assert_eq!(patterns[0].steps[0].0.types, vec!["X", "Y"]);
        assert_eq!(patterns[0].steps[1].0.direction, Direction::Both);
    }

    #[test]
    fn rejects_unsupported_constructs() {
        for text in [
            "MERGE (n:Contract) RETURN n",
            "MATCH (a)-[*1..3]->(b) RETURN b",
            "MATCH (n) WHERE n.name = $name RETURN n",
            "MATCH (n) RETURN n UNION MATCH (m) RETURN m",
        ] {
            assert!(
                matches!(parse(text), Err(CypherError::Unsupported(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn rejects_multiple_statements_and_missing_return() {
        assert!(matches!(
            parse("MATCH (n) RETURN n; MATCH (m) RETURN m"),
            Err(CypherError::Syntax { .. })
        ));
        assert!(matches!(
            parse("MATCH (n)"),
            Err(CypherError::Syntax { .. })
        ));
        assert!(parse("MATCH (n) RETURN n;").is_ok());
    }

    #[test]
    fn operator_precedence() {
        let query = parse("RETURN 1 + 2 * 3 = 7 AND NOT false").expect("parse");
        let Clause::Return(projection) = &query.clauses[0] else {
            panic!("expected RETURN");
        };
        assert!(matches!(
            projection.items[0].expr,
            Expr::Binary(BinaryOp::And, _, _)
        ));
    }
}
