// src/sema/syntaxer.rs
//! The pass driver. Analysis is a fixed sequence of whole-tree passes, each
//! building state the next one consumes; none may be skipped or reordered.
//!
//! 1. collect class/enum stubs, duplicate detection
//! 2. instantiate templates (depth-first, inner arguments before outer)
//! 3. collect inheritance, sends, member variables and properties
//! 4. composition-cycle detection over value-type fields
//! 5. collect function signatures, hiding checks
//! 6. decorate locations with enclosing class/function names
//! 7. full typing pass over every body (typing.rs)
//! 8. read/write capability audit

use crate::binding::{
    instantiate_template, Attribute, BindingError, BoundType, Context, CopyMode, DelegateParam,
    DelegateType, EnumValue, Field, FunctionFlags, FunctionId, GetterSetter, LibraryBuilder,
    LibraryRef, SendsEvent, TemplateError, Type, TypeId,
};
use crate::errors::{Diagnostics, SemanticError};
use crate::frontend::ast::*;
use crate::frontend::{CodeEntry, CodeLocation};
use crate::sema::rewrite;
use crate::sema::{cycles, typing, Analysis, Body, Io, Tables};
use rustc_hash::FxHashMap;

/// Name given to the per-class function that runs static field
/// initializers. Brackets keep it out of the user-identifier namespace.
pub(crate) const STATIC_INIT_NAME: &str = "[StaticInitializer]";

/// Run semantic analysis over a parsed program, producing a sealed library
/// plus typed, lowered bodies. Returns `None` when errors stopped the
/// pipeline (tolerant mode keeps going and still returns its partial
/// results).
pub fn analyze(
    ctx: &mut Context,
    program: &Program,
    library_name: &str,
    entries: &[CodeEntry],
    dependencies: &[LibraryRef],
    diagnostics: &mut Diagnostics,
) -> Option<Analysis> {
    let mut deps: Vec<LibraryRef> = Vec::with_capacity(dependencies.len() + 1);
    deps.push(ctx.core_library());
    deps.extend(dependencies.iter().cloned());

    let mut syntaxer = Syntaxer {
        ctx,
        diagnostics,
        dependencies: deps,
        builder: LibraryBuilder::new(library_name),
        ids: program.ids.clone(),
        tables: Tables::default(),
        classes: Vec::new(),
        templates: FxHashMap::default(),
        bodies: Vec::new(),
    };
    for entry in entries {
        syntaxer.builder.add_code_entry(entry.clone());
    }
    syntaxer.run(program)
}

struct ClassEntry {
    node: ClassNode,
    id: TypeId,
    /// Instance field initializers, prepended to every constructor.
    instance_inits: Vec<(String, Expr)>,
    /// Static field initializers, gathered into one hidden function.
    static_inits: Vec<(String, Expr)>,
}

struct PendingBody {
    function: FunctionId,
    owner: TypeId,
    statements: Vec<Statement>,
}

struct Syntaxer<'a> {
    ctx: &'a mut Context,
    diagnostics: &'a mut Diagnostics,
    dependencies: Vec<LibraryRef>,
    builder: LibraryBuilder,
    ids: NodeIdGen,
    tables: Tables,
    classes: Vec<ClassEntry>,
    templates: FxHashMap<String, ClassNode>,
    bodies: Vec<PendingBody>,
}

impl<'a> Syntaxer<'a> {
    fn run(mut self, program: &Program) -> Option<Analysis> {
        self.pass1_collect_stubs(program);
        if self.diagnostics.should_stop() {
            return None;
        }
        self.pass2_instantiate_templates();
        if self.diagnostics.should_stop() {
            return None;
        }
        self.pass3_collect_members();
        if self.diagnostics.should_stop() {
            return None;
        }
        self.pass4_composition_cycles();
        if self.diagnostics.should_stop() {
            return None;
        }
        self.pass5_collect_functions();
        if self.diagnostics.should_stop() {
            return None;
        }
        self.pass6_decorate_locations();

        // Layout is final from here on; the typing pass records absolute
        // field offsets and the code generator reuses them untouched.
        let builder = std::mem::replace(&mut self.builder, LibraryBuilder::new(""));
        let library = match builder.create_library(self.ctx) {
            Ok(library) => library,
            Err(BindingError::BaseCycle(name)) => {
                self.diagnostics.sema_error(
                    SemanticError::InheritanceCycle {
                        name,
                        span: (0, 0).into(),
                    },
                    CodeLocation::default(),
                );
                return None;
            }
            Err(_) => return None,
        };

        let mut bodies = Vec::with_capacity(self.bodies.len());
        for mut pending in std::mem::take(&mut self.bodies) {
            typing::check_body(
                self.ctx,
                &mut self.tables,
                self.diagnostics,
                &mut self.ids,
                &self.dependencies,
                pending.owner,
                pending.function,
                &mut pending.statements,
            );
            bodies.push(Body {
                function: pending.function,
                statements: pending.statements,
            });
            if self.diagnostics.should_stop() {
                return None;
            }
        }

        self.pass8_io_audit();
        if self.diagnostics.should_stop() {
            return None;
        }

        Some(Analysis {
            library,
            tables: self.tables,
            bodies,
        })
    }

    // ----- pass 1 -----

    fn pass1_collect_stubs(&mut self, program: &Program) {
        for class in &program.classes {
            if class.is_template() {
                if self.ctx.type_exists(&class.name) || self.templates.contains_key(&class.name) {
                    self.duplicate_type(&class.name, &class.name_location);
                    continue;
                }
                self.templates.insert(class.name.clone(), class.clone());
                continue;
            }
            self.register_class_stub(class.clone());
        }
        for node in &program.enums {
            self.register_enum(node);
        }
    }

    fn register_class_stub(&mut self, node: ClassNode) {
        let copy_mode = if node.is_struct {
            CopyMode::ValueType
        } else {
            CopyMode::ReferenceType
        };
        let mut bound = BoundType::new(&node.name, copy_mode, 0);
        bound.sealed = node.has_attribute("Sealed");
        bound.location = node.name_location.clone();
        bound.attributes = convert_attributes(&node.attributes);
        match self.builder.add_bound_type(self.ctx, bound) {
            Ok(id) => self.classes.push(ClassEntry {
                node,
                id,
                instance_inits: Vec::new(),
                static_inits: Vec::new(),
            }),
            Err(_) => self.duplicate_type(&node.name, &node.name_location),
        }
    }

    fn register_enum(&mut self, node: &EnumNode) {
        let mut bound = BoundType::new(&node.name, CopyMode::ValueType, 1);
        bound.sealed = true;
        bound.is_flags = node.is_flags;
        bound.location = node.location.clone();
        bound.attributes = convert_attributes(&node.attributes);
        let mut next = 0i64;
        for (index, value) in node.values.iter().enumerate() {
            if bound.enum_values.iter().any(|v| v.name == value.name) {
                self.diagnostics.sema_error(
                    SemanticError::DuplicateMember {
                        name: value.name.clone(),
                        type_name: node.name.clone(),
                        span: value.location.span(),
                    },
                    value.location.clone(),
                );
                continue;
            }
            let assigned = value.value.unwrap_or(if node.is_flags {
                1i64 << index
            } else {
                next
            });
            next = assigned + 1;
            bound.enum_values.push(EnumValue {
                name: value.name.clone(),
                value: assigned,
            });
        }
        if self.builder.add_bound_type(self.ctx, bound).is_err() {
            self.duplicate_type(&node.name, &node.location);
        }
    }

    // ----- pass 2 -----

    fn pass2_instantiate_templates(&mut self) {
        // Instantiations append to the class list and are scanned in turn,
        // so transitively mentioned templates all get built here.
        let mut index = 0;
        while index < self.classes.len() {
            let mut mentions = Vec::new();
            rewrite::collect_template_mentions(&mut self.classes[index].node, &mut mentions);
            for mention in mentions {
                self.resolve_type(&mention);
            }
            index += 1;
        }
    }

    /// Resolve a written type to a `Type`, instantiating templates on the
    /// way (arguments first, so inner instantiations exist before outer).
    fn resolve_type(&mut self, node: &SyntaxTypeNode) -> Option<Type> {
        if node.is_ref {
            let mut inner = node.clone();
            inner.is_ref = false;
            return match self.resolve_type(&inner)? {
                Type::Bound(id) => Some(Type::Indirect(id)),
                other => Some(other),
            };
        }
        if node.arguments.is_empty() {
            return match node.name.as_str() {
                "Void" => Some(Type::Void),
                "Any" => Some(Type::Any),
                name => {
                    if let Some(id) = self.ctx.find_type(name) {
                        Some(Type::Bound(id))
                    } else if self.templates.contains_key(name) || self.ctx.type_exists(name) {
                        self.error(
                            SemanticError::TemplateNotInstantiated {
                                name: name.to_string(),
                                span: node.location.span(),
                            },
                            &node.location,
                        );
                        None
                    } else {
                        self.error(
                            SemanticError::UnknownType {
                                name: name.to_string(),
                                span: node.location.span(),
                            },
                            &node.location,
                        );
                        None
                    }
                }
            };
        }

        let mut arguments = Vec::with_capacity(node.arguments.len());
        for argument in &node.arguments {
            arguments.push(self.resolve_type(argument)?);
        }

        if self.templates.contains_key(&node.name) {
            return self
                .instantiate_script_template(&node.name, &arguments, &node.location)
                .map(Type::Bound);
        }

        match instantiate_template(self.ctx, &node.name, &arguments) {
            Ok(id) => Some(Type::Bound(id)),
            Err(TemplateError::NotATemplate(name)) => {
                self.error(
                    SemanticError::UnknownType {
                        name,
                        span: node.location.span(),
                    },
                    &node.location,
                );
                None
            }
            Err(TemplateError::ArgumentCount {
                expected, found, ..
            }) => {
                self.error(
                    SemanticError::TemplateArgumentCount {
                        expected,
                        found,
                        span: node.location.span(),
                    },
                    &node.location,
                );
                None
            }
        }
    }

    /// Clone a script template's body with every formal parameter replaced
    /// by the actual argument's name, register it as an ordinary class, and
    /// memoize by the fully-qualified name.
    fn instantiate_script_template(
        &mut self,
        name: &str,
        arguments: &[Type],
        location: &CodeLocation,
    ) -> Option<TypeId> {
        let full_name = self.ctx.template_full_name(name, arguments);
        if let Some(&cached) = self.ctx.template_cache.get(&full_name) {
            return Some(cached);
        }
        let template = &self.templates[name];
        if template.template_params.len() != arguments.len() {
            self.error(
                SemanticError::TemplateArgumentCount {
                    expected: template.template_params.len(),
                    found: arguments.len(),
                    span: location.span(),
                },
                location,
            );
            return None;
        }

        let mut clone = template.clone();
        let substitutions: FxHashMap<String, String> = template
            .template_params
            .iter()
            .zip(arguments)
            .map(|((formal, _), actual)| (formal.clone(), self.ctx.type_to_string(actual)))
            .collect();
        rewrite::substitute_class(&mut clone, &|name| substitutions.get(name).cloned());
        clone.name = full_name.clone();
        clone.template_params.clear();
        self.renumber_class(&mut clone);

        self.register_class_stub(clone);
        let id = self.ctx.find_type(&full_name)?;
        self.ctx.ty_mut(id).template_base = Some(name.to_string());
        self.ctx.template_cache.insert(full_name, id);
        Some(id)
    }

    fn renumber_class(&mut self, class: &mut ClassNode) {
        for variable in &mut class.variables {
            if let Some(initializer) = &mut variable.initializer {
                rewrite::renumber_expr(initializer, &mut self.ids);
            }
            if let Some(property) = &mut variable.property {
                for body in [&mut property.get, &mut property.set].into_iter().flatten() {
                    rewrite::renumber_statements(body, &mut self.ids);
                }
            }
        }
        let all_functions = class
            .functions
            .iter_mut()
            .chain(class.constructors.iter_mut())
            .chain(class.destructor.iter_mut());
        for function in all_functions {
            rewrite::renumber_statements(&mut function.body, &mut self.ids);
        }
    }

    // ----- pass 3 -----

    fn pass3_collect_members(&mut self) {
        for index in 0..self.classes.len() {
            self.collect_class_members(index);
        }
    }

    fn collect_class_members(&mut self, index: usize) {
        let id = self.classes[index].id;

        // Inheritance first: layout and member lookups depend on it.
        if let Some(base_node) = self.classes[index].node.base.clone() {
            self.resolve_base(id, &base_node);
        }

        let sends = self.classes[index].node.sends.clone();
        for node in sends {
            if let Some(event_type) = self.resolve_type(&node.event_type) {
                self.ctx.ty_mut(id).sends.push(SendsEvent {
                    name: node.name,
                    event_type,
                });
            }
        }

        let variables = std::mem::take(&mut self.classes[index].node.variables);
        for variable in variables {
            self.collect_member_variable(index, id, variable);
        }
    }

    fn resolve_base(&mut self, id: TypeId, base_node: &SyntaxTypeNode) {
        let base = match self.resolve_type(base_node) {
            Some(Type::Bound(base)) => base,
            Some(_) => {
                self.error(
                    SemanticError::UnknownType {
                        name: base_node.name.clone(),
                        span: base_node.location.span(),
                    },
                    &base_node.location,
                );
                return;
            }
            None => return,
        };
        let derived_name = self.ctx.ty(id).name.clone();
        let base_bound = self.ctx.ty(base);
        if base_bound.sealed {
            self.error(
                SemanticError::BaseTypeSealed {
                    name: base_bound.name.clone(),
                    span: base_node.location.span(),
                },
                &base_node.location,
            );
            return;
        }
        if base_bound.copy_mode != self.ctx.ty(id).copy_mode {
            self.error(
                SemanticError::CopyModeMismatch {
                    base: self.ctx.ty(base).name.clone(),
                    derived: derived_name,
                    span: base_node.location.span(),
                },
                &base_node.location,
            );
            return;
        }
        if self.builder.set_base(self.ctx, id, base).is_err() {
            return;
        }
        if cycles::inheritance_cycle(self.ctx, id) {
            self.error(
                SemanticError::InheritanceCycle {
                    name: derived_name,
                    span: base_node.location.span(),
                },
                &base_node.location,
            );
            // Sever the link so later passes terminate.
            self.ctx.ty_mut(id).base = None;
        }
    }

    fn collect_member_variable(&mut self, index: usize, id: TypeId, variable: MemberVariableNode) {
        let ty = match self.resolve_type(&variable.ty) {
            Some(ty) => ty,
            None => return,
        };
        let is_static = variable.is_static();

        if let Some(property) = variable.property {
            self.collect_property(id, &variable.name, ty, is_static, property, &variable.location);
            return;
        }

        match self.builder.add_field(
            self.ctx,
            id,
            variable.name.clone(),
            ty,
            is_static,
            variable.location.clone(),
        ) {
            Ok(_) => {
                if let Some(initializer) = variable.initializer {
                    let inits = if is_static {
                        &mut self.classes[index].static_inits
                    } else {
                        &mut self.classes[index].instance_inits
                    };
                    inits.push((variable.name, initializer));
                }
            }
            Err(BindingError::DuplicateMember { type_name, member }) => {
                self.error(
                    SemanticError::DuplicateMember {
                        name: member,
                        type_name,
                        span: variable.location.span(),
                    },
                    &variable.location,
                );
            }
            Err(_) => {}
        }
    }

    /// Register the get/set stub functions for an explicit property. Their
    /// bodies are queued like ordinary function bodies.
    fn collect_property(
        &mut self,
        id: TypeId,
        name: &str,
        ty: Type,
        is_static: bool,
        property: PropertyBody,
        location: &CodeLocation,
    ) {
        let flags = FunctionFlags {
            is_static,
            is_hidden: true,
            ..Default::default()
        };
        let get = property.get.map(|statements| {
            let function = self.builder.add_function(
                self.ctx,
                Some(id),
                format!("{name}[Get]"),
                DelegateType {
                    params: Vec::new(),
                    return_type: ty.clone(),
                },
                flags,
                None,
                location.clone(),
            );
            self.ctx.function_mut(function).owning_property = Some(name.to_string());
            self.bodies.push(PendingBody {
                function,
                owner: id,
                statements,
            });
            function
        });
        let set = property.set.map(|statements| {
            let function = self.builder.add_function(
                self.ctx,
                Some(id),
                format!("{name}[Set]"),
                DelegateType {
                    params: vec![DelegateParam {
                        name: "value".into(),
                        ty: ty.clone(),
                    }],
                    return_type: Type::Void,
                },
                flags,
                None,
                location.clone(),
            );
            self.ctx.function_mut(function).owning_property = Some(name.to_string());
            self.bodies.push(PendingBody {
                function,
                owner: id,
                statements,
            });
            function
        });

        let result = self.builder.add_getter_setter(
            self.ctx,
            id,
            GetterSetter {
                name: name.to_string(),
                ty,
                is_static,
                get,
                set,
                location: location.clone(),
            },
        );
        if let Err(BindingError::DuplicateMember { type_name, member }) = result {
            self.error(
                SemanticError::DuplicateMember {
                    name: member,
                    type_name,
                    span: location.span(),
                },
                location,
            );
        }
    }

    // ----- pass 4 -----

    fn pass4_composition_cycles(&mut self) {
        let types: Vec<TypeId> = self.classes.iter().map(|c| c.id).collect();
        cycles::check_composition_cycles(self.ctx, &types, self.diagnostics);
    }

    // ----- pass 5 -----

    fn pass5_collect_functions(&mut self) {
        for index in 0..self.classes.len() {
            self.collect_class_functions(index);
        }
    }

    fn collect_class_functions(&mut self, index: usize) {
        let id = self.classes[index].id;

        let functions = std::mem::take(&mut self.classes[index].node.functions);
        for function in functions {
            self.collect_function(id, function);
        }

        let mut constructors = std::mem::take(&mut self.classes[index].node.constructors);
        if constructors.is_empty() {
            // Every scripted type gets a default constructor so `new T()`
            // and field initializers always work.
            constructors.push(FunctionNode {
                name: "Constructor".into(),
                name_location: self.classes[index].node.name_location.clone(),
                location: self.classes[index].node.name_location.clone(),
                kind: FunctionKind::Constructor,
                attributes: Vec::new(),
                params: Vec::new(),
                return_type: None,
                body: Vec::new(),
            });
        }
        for constructor in constructors {
            self.collect_constructor(index, id, constructor);
        }

        if let Some(destructor) = std::mem::take(&mut self.classes[index].node.destructor) {
            let function =
                self.builder
                    .add_destructor(self.ctx, id, None, destructor.location.clone());
            self.bodies.push(PendingBody {
                function,
                owner: id,
                statements: destructor.body,
            });
        }

        let static_inits = std::mem::take(&mut self.classes[index].static_inits);
        if !static_inits.is_empty() {
            self.synthesize_static_initializer(id, static_inits);
        }
    }

    fn function_signature(&mut self, node: &FunctionNode) -> Option<DelegateType> {
        let mut params = Vec::with_capacity(node.params.len());
        for param in &node.params {
            params.push(DelegateParam {
                name: param.name.clone(),
                ty: self.resolve_type(&param.ty)?,
            });
        }
        let return_type = match &node.return_type {
            Some(ty) => self.resolve_type(ty)?,
            None => Type::Void,
        };
        Some(DelegateType {
            params,
            return_type,
        })
    }

    fn collect_function(&mut self, id: TypeId, node: FunctionNode) {
        let delegate = match self.function_signature(&node) {
            Some(delegate) => delegate,
            None => return,
        };
        let flags = FunctionFlags {
            is_static: node.is_static(),
            is_virtual: node.has_attribute("Virtual"),
            is_override: node.has_attribute("Override"),
            is_hidden: node.has_attribute("Hidden"),
        };

        // A member that shadows a base member must say so with [Override],
        // and the base member must actually be virtual.
        if let Some(base) = self.ctx.ty(id).base {
            if let Some(shadowed) = self.find_base_member(base, &node.name, flags.is_static) {
                let base_name = self.ctx.ty(shadowed).name.clone();
                let base_is_virtual = self
                    .ctx
                    .ty(shadowed)
                    .find_functions(&node.name, flags.is_static)
                    .map(|ids| {
                        ids.iter()
                            .any(|&f| self.ctx.function(f).flags.is_virtual)
                    })
                    .unwrap_or(false);
                if !(flags.is_override && base_is_virtual) {
                    self.error(
                        SemanticError::HidesBaseMember {
                            name: node.name.clone(),
                            base: base_name,
                            span: node.name_location.span(),
                        },
                        &node.name_location,
                    );
                }
            }
        }

        let function = self.builder.add_function(
            self.ctx,
            Some(id),
            node.name,
            delegate,
            flags,
            None,
            node.location,
        );
        self.bodies.push(PendingBody {
            function,
            owner: id,
            statements: node.body,
        });
    }

    /// The first base type up the chain declaring a member with this name.
    fn find_base_member(&self, mut base: TypeId, name: &str, is_static: bool) -> Option<TypeId> {
        loop {
            if self.ctx.ty(base).has_member(name, is_static) {
                return Some(base);
            }
            base = self.ctx.ty(base).base?;
        }
    }

    fn collect_constructor(&mut self, index: usize, id: TypeId, node: FunctionNode) {
        let delegate = match self.function_signature(&node) {
            Some(delegate) => delegate,
            None => return,
        };
        let function = self.builder.add_constructor(
            self.ctx,
            id,
            delegate.params,
            None,
            node.location.clone(),
        );

        // Field initializers run first in every constructor; explicit
        // `this.` keeps parameters from shadowing the field names.
        let mut statements: Vec<Statement> = Vec::new();
        let inits = self.classes[index].instance_inits.clone();
        for (field_name, initializer) in inits {
            statements.push(self.field_init_statement(&field_name, initializer, false, id));
        }
        statements.extend(node.body);

        self.bodies.push(PendingBody {
            function,
            owner: id,
            statements,
        });
    }

    fn field_init_statement(
        &mut self,
        field_name: &str,
        mut initializer: Expr,
        is_static: bool,
        owner: TypeId,
    ) -> Statement {
        rewrite::renumber_expr(&mut initializer, &mut self.ids);
        let location = initializer.location.clone();
        let base = if is_static {
            Expr::new(
                self.ids.fresh(),
                location.clone(),
                ExprKind::StaticType(SyntaxTypeNode::simple(
                    self.ctx.ty(owner).name.clone(),
                    location.clone(),
                )),
            )
        } else {
            Expr::new(self.ids.fresh(), location.clone(), ExprKind::This)
        };
        let target = Expr::new(
            self.ids.fresh(),
            location.clone(),
            ExprKind::MemberAccess {
                base: Box::new(base),
                name: field_name.to_string(),
                name_location: location.clone(),
            },
        );
        let assign = Expr::new(
            self.ids.fresh(),
            location.clone(),
            ExprKind::Binary {
                op: BinaryOp::Assign,
                lhs: Box::new(target),
                rhs: Box::new(initializer),
            },
        );
        Statement::Expression(assign)
    }

    /// One hidden static function per class holding its static field
    /// initializers; the executable state runs these at link time.
    fn synthesize_static_initializer(&mut self, id: TypeId, inits: Vec<(String, Expr)>) {
        let function = self.builder.add_function(
            self.ctx,
            Some(id),
            STATIC_INIT_NAME,
            DelegateType {
                params: Vec::new(),
                return_type: Type::Void,
            },
            FunctionFlags {
                is_static: true,
                is_hidden: true,
                ..Default::default()
            },
            None,
            self.ctx.ty(id).location.clone(),
        );
        let statements = inits
            .into_iter()
            .map(|(name, init)| self.field_init_statement(&name, init, true, id))
            .collect();
        self.bodies.push(PendingBody {
            function,
            owner: id,
            statements,
        });
    }

    // ----- pass 6 -----

    fn pass6_decorate_locations(&mut self) {
        for pending in &mut self.bodies {
            let class_name = self.ctx.ty(pending.owner).name.clone();
            let function_name = self.ctx.function(pending.function).name.clone();
            rewrite::decorate_statements(&mut pending.statements, &class_name, &function_name);
        }
    }

    // ----- pass 8 -----

    /// Confirm every expression is used within its capability. Usage is
    /// only known from the parent, so this runs after the whole typing pass
    /// rather than during it.
    fn pass8_io_audit(&mut self) {
        let mut violations: Vec<(SemanticError, CodeLocation)> = Vec::new();
        for (&id, usage) in &self.tables.io_usage {
            let capability = self.tables.io.get(&id).copied().unwrap_or(Io::READ_WRITE);
            let location = self
                .tables
                .locations
                .get(&id)
                .cloned()
                .unwrap_or_default();
            if usage.write && !capability.write {
                violations.push((
                    SemanticError::NotWritable {
                        span: location.span(),
                    },
                    location.clone(),
                ));
            }
            if usage.read && !capability.read {
                violations.push((
                    SemanticError::NotReadable {
                        span: location.span(),
                    },
                    location,
                ));
            }
        }
        for (error, location) in violations {
            self.diagnostics.sema_error(error, location);
        }
    }

    // ----- shared -----

    fn duplicate_type(&mut self, name: &str, location: &CodeLocation) {
        self.diagnostics.sema_error(
            SemanticError::DuplicateTypeName {
                name: name.to_string(),
                span: location.span(),
            },
            location.clone(),
        );
    }

    fn error(&mut self, error: SemanticError, location: &CodeLocation) {
        self.diagnostics.sema_error(error, location.clone());
    }
}

fn convert_attributes(attributes: &[AttributeNode]) -> Vec<Attribute> {
    attributes
        .iter()
        .map(|a| Attribute {
            name: a.name.clone(),
            arguments: a.arguments.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::tests::parse_source;
    use crate::frontend::CodeEntry;

    fn analyze_source(source: &str) -> (Context, Diagnostics, Option<Analysis>) {
        let mut ctx = Context::new();
        let (program, mut diagnostics) = parse_source(source);
        assert!(!diagnostics.has_errors(), "parse failed: {source}");
        let entries = vec![CodeEntry::new(source, "test")];
        let analysis = analyze(
            &mut ctx,
            &program,
            "test",
            &entries,
            &[],
            &mut diagnostics,
        );
        (ctx, diagnostics, analysis)
    }

    fn first_error(diagnostics: &Diagnostics) -> String {
        diagnostics.errors.first().map(|e| e.message()).unwrap()
    }

    #[test]
    fn simple_class_analyzes() {
        let (ctx, diagnostics, analysis) =
            analyze_source("class Foo { var X : Integer = 5; function Bump() { X += 1; } }");
        assert!(!diagnostics.has_errors(), "{}", first_error(&diagnostics));
        let analysis = analysis.unwrap();
        let foo = ctx.find_type("Foo").unwrap();
        assert_eq!(ctx.ty(foo).size, 1);
        assert!(ctx.ty(foo).find_field("X").is_some());
        // Bump, plus the synthesized default constructor.
        assert_eq!(analysis.bodies.len(), 2);
    }

    #[test]
    fn duplicate_type_reported() {
        let (_, diagnostics, _) = analyze_source("class A {} class A {}");
        assert!(first_error(&diagnostics).contains("duplicate type name 'A'"));
    }

    #[test]
    fn composition_cycle_rejected() {
        let (ctx, diagnostics, _) = analyze_source(
            "struct A { var Other : B; } struct B { var Other : A; }",
        );
        assert!(diagnostics.has_errors());
        assert!(first_error(&diagnostics).contains("contains itself by value"));
        // The stub exists but no layout was committed beyond field slots.
        assert!(ctx.find_type("A").is_some());
    }

    #[test]
    fn struct_cannot_extend_class() {
        let (_, diagnostics, _) = analyze_source("class A {} struct B : A {}");
        assert!(first_error(&diagnostics).contains("copy mode"));
    }

    #[test]
    fn hiding_base_member_rejected() {
        let (_, diagnostics, _) = analyze_source(
            "class A { function F() {} } class B : A { function F() {} }",
        );
        assert!(first_error(&diagnostics).contains("hides a member"));
    }

    #[test]
    fn override_of_virtual_allowed() {
        let (_, diagnostics, _) = analyze_source(
            "class A { [Virtual] function F() {} } class B : A { [Override] function F() {} }",
        );
        assert!(!diagnostics.has_errors(), "{}", first_error(&diagnostics));
    }

    #[test]
    fn sealed_base_rejected() {
        let (_, diagnostics, _) =
            analyze_source("[Sealed] class A {} class B : A {}");
        assert!(first_error(&diagnostics).contains("sealed"));
    }

    #[test]
    fn enum_values_auto_increment() {
        let (ctx, diagnostics, _) = analyze_source("enum Color { Red, Green, Blue }");
        assert!(!diagnostics.has_errors());
        let color = ctx.find_type("Color").unwrap();
        let values: Vec<i64> = ctx.ty(color).enum_values.iter().map(|v| v.value).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn script_template_instantiates_on_mention() {
        let (ctx, diagnostics, _) = analyze_source(
            "class Box[T] { var Item : T; } class User { var B : Box[Integer]; }",
        );
        assert!(!diagnostics.has_errors(), "{}", first_error(&diagnostics));
        let boxed = ctx.find_type("Box[Integer]").unwrap();
        let core = ctx.core_types();
        assert_eq!(
            ctx.ty(boxed).find_field("Item").unwrap().ty,
            Type::Bound(core.integer)
        );
    }

    #[test]
    fn property_registers_accessors() {
        let (ctx, diagnostics, _) = analyze_source(
            "class A { var Backing : Integer = 0; var X : Integer { get { return Backing; } set { Backing = value; } } }",
        );
        assert!(!diagnostics.has_errors(), "{}", first_error(&diagnostics));
        let a = ctx.find_type("A").unwrap();
        let property = ctx.ty(a).find_property("X", false).unwrap();
        assert!(property.get.is_some());
        assert!(property.set.is_some());
    }
}
