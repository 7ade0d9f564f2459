//! Reification (phase A): parse tree to typed AST.
//!
//! A pure tree rewrite: every parse node becomes a typed-AST node in a
//! fresh arena. Declaration binders get their `AstSymbol` created here
//! (with constructor/enum/wrapper metadata for data declarations); every
//! occurrence gets an unresolved placeholder symbol carrying only the
//! source name, which the renamer later rebinds.
//!
//! Integer and floating-point literals become applications of the
//! overloaded `fromInt` / `fromRational` methods; resolution of the
//! overload happens during inference and monomorphization.

use crate::base::{Interner, SourceSpan, Symbol};
use crate::syntax::ast::{AstArena, AstId, AstKind, ConKind, Constant, SigKind, VarKind};
use crate::syntax::parse_ast::{ParseAstArena, ParseAstKind, ParseId};
use crate::syntax::symbol::{AstSymbol, SymbolId, SymbolTable};

/// Position of the node being reified; decides variable roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Expr,
    Pattern,
    Type,
}

struct Reifier<'a> {
    parse: &'a ParseAstArena,
    interner: &'a mut Interner,
    symbols: &'a mut SymbolTable,
    ast: AstArena,
    module_name: Symbol,
}

/// Reify a parse tree into a typed AST rooted at the module's top
/// declaration list. Never fails; name errors surface in the renamer.
pub fn reify(
    parse: &ParseAstArena,
    interner: &mut Interner,
    symbols: &mut SymbolTable,
    ast: AstArena,
) -> AstArena {
    let module_name = parse.module_name.clone();
    let mut reifier = Reifier {
        parse,
        interner,
        symbols,
        ast,
        module_name,
    };
    if let Some(root) = parse.root {
        let root = reifier.go(root, Mode::Expr);
        reifier.ast.root = Some(root);
    }
    reifier.ast
}

impl<'a> Reifier<'a> {
    fn placeholder(&mut self, name: Symbol, span: SourceSpan) -> SymbolId {
        self.symbols.insert(AstSymbol::new(
            name.clone(),
            name,
            self.module_name.clone(),
            span,
        ))
    }

    fn binder(&mut self, name: Symbol, span: SourceSpan) -> SymbolId {
        self.placeholder(name, span)
    }

    /// Wrap a literal in its overloaded conversion.
    fn overloaded_literal(&mut self, method: &str, lit: AstId, span: SourceSpan) -> AstId {
        let name = self.interner.intern(method);
        let symbol = self.placeholder(name, span);
        let var = self.ast.create_var(symbol, VarKind::Var, span);
        self.ast.create_app(var, lit, span)
    }

    fn go_all(&mut self, ids: &[ParseId], mode: Mode) -> Vec<AstId> {
        ids.iter().map(|&id| self.go(id, mode)).collect()
    }

    fn go(&mut self, id: ParseId, mode: Mode) -> AstId {
        let span = self.parse.get(id).span;
        match self.parse.kind(id).clone() {
            ParseAstKind::TopDecl { declarations } => {
                let declarations = self.go_all(&declarations, Mode::Expr);
                self.ast.alloc(AstKind::TopDecl { declarations }, span)
            }
            ParseAstKind::DeclarationList { declarations } => {
                let declarations = self.go_all(&declarations, Mode::Expr);
                self.ast
                    .alloc(AstKind::DeclarationList { declarations }, span)
            }

            ParseAstKind::SimpleAssignment {
                name,
                initializer,
                rhs,
            } => {
                let symbol = self.binder(name, span);
                let initializer = initializer.map(|i| self.go(i, Mode::Expr));
                let rhs = self.go(rhs, Mode::Expr);
                let node = self.ast.alloc(
                    AstKind::SimpleAssignment {
                        symbol,
                        initializer,
                        rhs,
                        is_recursive: false,
                    },
                    span,
                );
                self.symbols.get_mut(symbol).ast = Some(node);
                node
            }

            ParseAstKind::ApatsAssignment { name, apats, rhs } => {
                let symbol = self.binder(name, span);
                let apats = self.go_all(&apats, Mode::Pattern);
                let rhs = self.go(rhs, Mode::Expr);
                let node = self.ast.alloc(
                    AstKind::ApatsAssignment {
                        symbol,
                        apats,
                        rhs,
                        is_recursive: false,
                    },
                    span,
                );
                self.symbols.get_mut(symbol).ast = Some(node);
                node
            }

            ParseAstKind::PatAssignment { pat, rhs } => {
                let pat = self.go(pat, Mode::Pattern);
                let rhs = self.go(rhs, Mode::Expr);
                self.ast.alloc(AstKind::PatAssignment { pat, rhs }, span)
            }

            ParseAstKind::Rhs {
                expression,
                declarations,
            } => {
                let declarations = declarations.map(|d| self.go(d, Mode::Expr));
                let expression = self.go(expression, Mode::Expr);
                self.ast.alloc(
                    AstKind::Rhs {
                        expression,
                        declarations,
                    },
                    span,
                )
            }

            ParseAstKind::TypeSignature { name, context, ty } => {
                let symbol = self.placeholder(name, span);
                let var = self.ast.create_var(symbol, VarKind::Sig, span);
                let context = self.go_all(&context, Mode::Type);
                let ty = self.go(ty, Mode::Type);
                self.ast.alloc(
                    AstKind::TypeSignature {
                        var,
                        context,
                        ty,
                        sig_kind: SigKind::TypeSig,
                    },
                    span,
                )
            }

            ParseAstKind::DataDeclaration {
                simple_type,
                constructors,
            } => self.reify_data_declaration(simple_type, &constructors, span),

            ParseAstKind::TypeClassDeclaration {
                context,
                class_name,
                class_var,
                declarations,
            } => {
                let symbol = self.binder(class_name, span);
                let context = self.go_all(&context, Mode::Type);
                let var_symbol = self.binder(class_var, span);
                let class_var =
                    self.ast
                        .create_var(var_symbol, VarKind::TypeVarDeclaration, span);
                let declarations = declarations.map(|d| self.reify_class_body(d));
                let node = self.ast.alloc(
                    AstKind::TypeClassDeclaration {
                        symbol,
                        context,
                        class_var,
                        declarations,
                    },
                    span,
                );
                self.symbols.get_mut(symbol).ast = Some(node);
                node
            }

            ParseAstKind::TypeClassInstance {
                context,
                class_name,
                inst,
                declarations,
            } => {
                // Instances register under the concatenated Class@Data
                // symbol; super-class dependency edges look them up by it.
                let data_name = self.instance_head_name(inst);
                let instance_name = self.interner.intern(&format!(
                    "{}@{}",
                    class_name.as_str(),
                    data_name.as_str()
                ));
                let symbol = self.binder(instance_name, span);
                let context = self.go_all(&context, Mode::Type);
                let class_symbol = self.placeholder(class_name, span);
                let class_conid = self
                    .ast
                    .create_conid(class_symbol, ConKind::TypeUse, span);
                let inst = self.go(inst, Mode::Type);
                let declarations = declarations.map(|d| self.go(d, Mode::Expr));
                let node = self.ast.alloc(
                    AstKind::TypeClassInstance {
                        symbol,
                        context,
                        class_conid,
                        inst,
                        declarations,
                    },
                    span,
                );
                self.symbols.get_mut(symbol).ast = Some(node);
                node
            }

            ParseAstKind::TypeClassContext { class_name, var } => {
                let class_symbol = self.placeholder(class_name, span);
                let class_conid = self
                    .ast
                    .create_conid(class_symbol, ConKind::TypeUse, span);
                let var_symbol = self.placeholder(var, span);
                let var = self.ast.create_var(var_symbol, VarKind::TypeFreeVar, span);
                self.ast
                    .alloc(AstKind::TypeClassContext { class_conid, var }, span)
            }

            ParseAstKind::Variable { name, initializer } => {
                let symbol = self.placeholder(name, span);
                let var_kind = match mode {
                    Mode::Expr => VarKind::Var,
                    Mode::Pattern => VarKind::Declaration,
                    Mode::Type => VarKind::TypeFreeVar,
                };
                let initializer = initializer.map(|i| self.go(i, Mode::Expr));
                self.ast.alloc(
                    AstKind::Variable {
                        symbol,
                        var_kind,
                        initializer,
                        inst_subs: Vec::new(),
                    },
                    span,
                )
            }

            ParseAstKind::ConId { name } => {
                let symbol = self.placeholder(name, span);
                let con_kind = match mode {
                    Mode::Expr => ConKind::Var,
                    Mode::Pattern => ConKind::Pattern,
                    Mode::Type => ConKind::TypeUse,
                };
                self.ast.create_conid(symbol, con_kind, span)
            }

            ParseAstKind::Constructor { name, args } => {
                let symbol = self.placeholder(name, span);
                let con_kind = match mode {
                    Mode::Expr => ConKind::Var,
                    Mode::Pattern => ConKind::Pattern,
                    Mode::Type => ConKind::TypeUse,
                };
                let conid = self.ast.create_conid(symbol, con_kind, span);
                let args = self.go_all(&args, mode);
                self.ast.alloc(AstKind::Constructor { conid, args }, span)
            }

            ParseAstKind::Constant { value } => {
                let lit = self.ast.alloc(
                    AstKind::Constant {
                        value: value.clone(),
                    },
                    span,
                );
                if mode != Mode::Expr {
                    return lit;
                }
                match value {
                    Constant::Integer(_) => self.overloaded_literal("fromInt", lit, span),
                    Constant::Float(_) => self.overloaded_literal("fromRational", lit, span),
                    _ => lit,
                }
            }

            ParseAstKind::Wildcard => self.ast.create_wildcard(span),

            ParseAstKind::App { function, argument } => {
                let function = self.go(function, mode);
                let argument = self.go(argument, mode);
                self.ast.create_app(function, argument, span)
            }

            ParseAstKind::BinOp { op, lhs, rhs } => {
                let symbol = self.placeholder(op, span);
                let lhs = self.go(lhs, mode);
                let rhs = self.go(rhs, mode);
                self.ast.alloc(
                    AstKind::BinOp {
                        symbol,
                        lhs,
                        rhs,
                        inst_subs: Vec::new(),
                    },
                    span,
                )
            }

            ParseAstKind::BinOpSym { op, left, right } => {
                let symbol = self.placeholder(op, span);
                let op = self.ast.create_conid(symbol, ConKind::Pattern, span);
                let left = self.go(left, Mode::Pattern);
                let right = self.go(right, Mode::Pattern);
                self.ast.alloc(AstKind::BinOpSym { op, left, right }, span)
            }

            ParseAstKind::OpLeftSection { op, left } => {
                let symbol = self.placeholder(op, span);
                let left = self.go(left, Mode::Expr);
                self.ast.alloc(
                    AstKind::OpLeftSection {
                        symbol,
                        left,
                        inst_subs: Vec::new(),
                    },
                    span,
                )
            }

            ParseAstKind::OpRightSection { op, right } => {
                let symbol = self.placeholder(op, span);
                let right = self.go(right, Mode::Expr);
                self.ast.alloc(
                    AstKind::OpRightSection {
                        symbol,
                        right,
                        inst_subs: Vec::new(),
                    },
                    span,
                )
            }

            ParseAstKind::IfThenElse {
                if_expr,
                then_expr,
                else_expr,
            } => {
                let if_expr = self.go(if_expr, Mode::Expr);
                let then_expr = self.go(then_expr, Mode::Expr);
                let else_expr = self.go(else_expr, Mode::Expr);
                self.ast.alloc(
                    AstKind::IfThenElse {
                        if_expr,
                        then_expr,
                        else_expr,
                    },
                    span,
                )
            }

            ParseAstKind::Lambda { apats, expression } => {
                let apats = self.go_all(&apats, Mode::Pattern);
                let expression = self.go(expression, Mode::Expr);
                self.ast.create_lambda(apats, expression, span)
            }

            ParseAstKind::Let {
                declarations,
                expression,
            } => {
                let declarations = self.go(declarations, Mode::Expr);
                let expression = self.go(expression, Mode::Expr);
                self.ast.alloc(
                    AstKind::Let {
                        declarations,
                        expression,
                    },
                    span,
                )
            }

            ParseAstKind::Case {
                expression,
                alternatives,
            } => {
                let expression = self.go(expression, Mode::Expr);
                let alternatives = self.go_all(&alternatives, Mode::Expr);
                self.ast.create_case(expression, alternatives, span)
            }

            ParseAstKind::CaseAlternative { pat, body } => {
                let pat = self.go(pat, Mode::Pattern);
                let body = self.go(body, Mode::Expr);
                self.ast.alloc(AstKind::CaseAlternative { pat, body }, span)
            }

            ParseAstKind::Tuple { expressions } => {
                let expressions = self.go_all(&expressions, mode);
                self.ast.alloc(AstKind::Tuple { expressions }, span)
            }
            ParseAstKind::ExpressionList { expressions } => {
                let expressions = self.go_all(&expressions, mode);
                self.ast
                    .alloc(AstKind::ExpressionList { expressions }, span)
            }
            ParseAstKind::ExpressionArray { expressions } => {
                let expressions = self.go_all(&expressions, mode);
                self.ast
                    .alloc(AstKind::ExpressionArray { expressions }, span)
            }
            ParseAstKind::PatExpression { expressions } => {
                let expressions = self.go_all(&expressions, Mode::Expr);
                self.ast
                    .alloc(AstKind::PatExpression { expressions }, span)
            }
            ParseAstKind::SeqExpression { expressions } => {
                let expressions = self.go_all(&expressions, Mode::Expr);
                self.ast
                    .alloc(AstKind::SeqExpression { expressions }, span)
            }

            ParseAstKind::ArithmeticSequence { from, then, to } => {
                let from = self.go(from, Mode::Expr);
                let then = then.map(|t| self.go(t, Mode::Expr));
                let to = to.map(|t| self.go(t, Mode::Expr));
                self.ast
                    .alloc(AstKind::ArithmeticSequence { from, then, to }, span)
            }

            ParseAstKind::Do { statements } => {
                let statements = self.go_all(&statements, Mode::Expr);
                self.ast.alloc(AstKind::Do { statements }, span)
            }

            ParseAstKind::BindAssignment { name, expression } => {
                let symbol = self.binder(name, span);
                let expression = self.go(expression, Mode::Expr);
                self.ast
                    .alloc(AstKind::BindAssignment { symbol, expression }, span)
            }

            ParseAstKind::PatBindAssignment { pat, expression } => {
                let pat = self.go(pat, Mode::Pattern);
                let expression = self.go(expression, Mode::Expr);
                self.ast
                    .alloc(AstKind::PatBindAssignment { pat, expression }, span)
            }

            ParseAstKind::ForLoop {
                range_init,
                value_init,
                index_apat,
                value_apat,
                expression,
            } => {
                let range_init = self.go(range_init, Mode::Expr);
                let value_init = self.go(value_init, Mode::Expr);
                let index_apat = self.go(index_apat, Mode::Pattern);
                let value_apat = self.go(value_apat, Mode::Pattern);
                let expression = self.go(expression, Mode::Expr);
                self.ast.alloc(
                    AstKind::ForLoop {
                        range_init,
                        value_init,
                        index_apat,
                        value_apat,
                        expression,
                    },
                    span,
                )
            }

            ParseAstKind::WhileLoop {
                value_init,
                value_apat,
                while_expression,
                do_expression,
            } => {
                let value_init = self.go(value_init, Mode::Expr);
                let value_apat = self.go(value_apat, Mode::Pattern);
                let while_expression = self.go(while_expression, Mode::Expr);
                let do_expression = self.go(do_expression, Mode::Expr);
                self.ast.alloc(
                    AstKind::WhileLoop {
                        value_init,
                        value_apat,
                        while_expression,
                        do_expression,
                    },
                    span,
                )
            }

            ParseAstKind::SimpleType {
                type_con,
                type_vars,
            } => {
                let con_symbol = self.placeholder(type_con, span);
                let type_con = self
                    .ast
                    .create_conid(con_symbol, ConKind::TypeDeclaration, span);
                let type_vars = type_vars
                    .iter()
                    .map(|name| {
                        let symbol = self.placeholder(name.clone(), span);
                        self.ast
                            .create_var(symbol, VarKind::TypeVarDeclaration, span)
                    })
                    .collect();
                self.ast.alloc(
                    AstKind::SimpleType {
                        type_con,
                        type_vars,
                    },
                    span,
                )
            }

            ParseAstKind::TypeCon { name } => {
                let symbol = self.placeholder(name, span);
                self.ast.create_conid(symbol, ConKind::TypeUse, span)
            }
            ParseAstKind::TypeVar { name } => {
                let symbol = self.placeholder(name, span);
                self.ast.create_var(symbol, VarKind::TypeFreeVar, span)
            }
            ParseAstKind::TypeApp { ty, arg } => {
                let ty = self.go(ty, Mode::Type);
                let arg = self.go(arg, Mode::Type);
                self.ast.alloc(AstKind::TypeApp { ty, arg }, span)
            }
            ParseAstKind::FunctionType { arg, result } => {
                let arg = self.go(arg, Mode::Type);
                let result = self.go(result, Mode::Type);
                self.ast.alloc(AstKind::FunctionType { arg, result }, span)
            }
            ParseAstKind::TypeAttribute {
                attributed_type,
                attribute,
            } => {
                let attributed_type = self.go(attributed_type, Mode::Type);
                self.ast.alloc(
                    AstKind::TypeAttribute {
                        attributed_type,
                        attribute,
                    },
                    span,
                )
            }
        }
    }

    /// The data-type name an instance head mentions.
    fn instance_head_name(&mut self, inst: ParseId) -> Symbol {
        match self.parse.kind(inst) {
            ParseAstKind::ConId { name } => name.clone(),
            ParseAstKind::Constructor { name, .. } => name.clone(),
            ParseAstKind::TypeCon { name } => name.clone(),
            ParseAstKind::SimpleType { type_con, .. } => type_con.clone(),
            _ => self.interner.intern("_"),
        }
    }

    fn reify_data_declaration(
        &mut self,
        simple_type: ParseId,
        constructors: &[ParseId],
        span: SourceSpan,
    ) -> AstId {
        let ParseAstKind::SimpleType {
            type_con,
            type_vars,
        } = self.parse.kind(simple_type).clone()
        else {
            // Malformed parse trees still reify; the renamer will fault.
            let simple_type = self.go(simple_type, Mode::Type);
            let constructors = self.go_all(constructors, Mode::Type);
            let placeholder = {
                let name = self.interner.intern("_");
                self.placeholder(name, span)
            };
            return self.ast.alloc(
                AstKind::DataDeclaration {
                    symbol: placeholder,
                    simple_type,
                    constructors,
                    is_recursive: false,
                },
                span,
            );
        };

        let type_symbol = self.binder(type_con, span);
        let type_conid = self
            .ast
            .create_conid(type_symbol, ConKind::TypeDeclaration, span);
        let type_var_nodes = type_vars
            .iter()
            .map(|name| {
                let symbol = self.binder(name.clone(), span);
                self.ast
                    .create_var(symbol, VarKind::TypeVarDeclaration, span)
            })
            .collect();
        let simple_type_node = self.ast.alloc(
            AstKind::SimpleType {
                type_con: type_conid,
                type_vars: type_var_nodes,
            },
            span,
        );

        // Constructor symbols carry con_num/arity, and the data type's
        // enum/wrapper classification falls out of their shapes.
        let mut con_nodes = Vec::with_capacity(constructors.len());
        let mut all_nullary = true;
        let mut arities = Vec::with_capacity(constructors.len());
        for (con_num, &con) in constructors.iter().enumerate() {
            let con_span = self.parse.get(con).span;
            let (name, args) = match self.parse.kind(con).clone() {
                ParseAstKind::Constructor { name, args } => (name, args),
                ParseAstKind::ConId { name } => (name, Vec::new()),
                _ => (self.interner.intern("_"), Vec::new()),
            };
            let con_symbol = self.binder(name, con_span);
            {
                let sym = self.symbols.get_mut(con_symbol);
                sym.is_constructor = true;
                sym.con_num = con_num;
                sym.arity = Some(args.len());
            }
            arities.push(args.len());
            all_nullary &= args.is_empty();
            let conid = self.ast.create_conid(con_symbol, ConKind::Var, con_span);
            let args = self.go_all(&args, Mode::Type);
            let node = self
                .ast
                .alloc(AstKind::Constructor { conid, args }, con_span);
            self.symbols.get_mut(con_symbol).ast = Some(node);
            con_nodes.push(node);
        }

        let is_enum = all_nullary && !con_nodes.is_empty();
        let is_wrapper = arities.len() == 1 && arities[0] == 1;
        let node = self.ast.alloc(
            AstKind::DataDeclaration {
                symbol: type_symbol,
                simple_type: simple_type_node,
                constructors: con_nodes.clone(),
                is_recursive: false,
            },
            span,
        );
        {
            let sym = self.symbols.get_mut(type_symbol);
            sym.ast = Some(node);
            sym.is_enum = is_enum;
            sym.is_wrapper = is_wrapper;
        }
        // Enum constructors are copy values; a wrapper's constructor
        // carries the wrapper flag itself so term rewrites can see it.
        if is_enum || is_wrapper {
            for &con_node in &con_nodes {
                if let AstKind::Constructor { conid, .. } = self.ast.kind(con_node) {
                    if let AstKind::ConId { symbol, .. } = self.ast.kind(*conid) {
                        let symbol = *symbol;
                        let sym = self.symbols.get_mut(symbol);
                        sym.is_enum = is_enum;
                        sym.is_wrapper = is_wrapper;
                    }
                }
            }
        }
        node
    }

    /// Class bodies hold method signatures (and default methods); method
    /// signatures bind the method name.
    fn reify_class_body(&mut self, declarations: ParseId) -> AstId {
        let span = self.parse.get(declarations).span;
        let ParseAstKind::DeclarationList { declarations } =
            self.parse.kind(declarations).clone()
        else {
            return self.go(declarations, Mode::Expr);
        };
        let mut out = Vec::with_capacity(declarations.len());
        for decl in declarations {
            let decl_span = self.parse.get(decl).span;
            match self.parse.kind(decl).clone() {
                ParseAstKind::TypeSignature { name, context, ty } => {
                    let symbol = self.binder(name, decl_span);
                    let var = self.ast.create_var(symbol, VarKind::ClassSig, decl_span);
                    let context = self.go_all(&context, Mode::Type);
                    let ty = self.go(ty, Mode::Type);
                    let node = self.ast.alloc(
                        AstKind::TypeSignature {
                            var,
                            context,
                            ty,
                            sig_kind: SigKind::ClassSig,
                        },
                        decl_span,
                    );
                    self.symbols.get_mut(symbol).ast = Some(node);
                    out.push(node);
                }
                _ => out.push(self.go(decl, Mode::Expr)),
            }
        }
        self.ast
            .alloc(AstKind::DeclarationList { declarations: out }, span)
    }
}
