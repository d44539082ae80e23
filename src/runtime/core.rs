// src/runtime/core.rs
//! The core library, bound into every context: the scalar types, String,
//! Exception, the Array template, and Console. Everything here is native;
//! scripted libraries link against it implicitly.

use crate::binding::{
    BoundType, Context, CopyMode, CoreTypes, DelegateParam, DelegateType, Function, FunctionFlags,
    FunctionId, GetterSetter, LibraryBuilder, LibraryRef, ManagerKind, NativeFn, Type, TypeId,
};
use crate::frontend::CodeLocation;
use crate::runtime::handle::Value;
use crate::runtime::managers::ObjectData;
use std::rc::Rc;

/// Build and seal the core library into a fresh context.
pub fn build_core(ctx: &mut Context) -> LibraryRef {
    let mut builder = LibraryBuilder::new("Core");

    let integer = bind_scalar(ctx, &mut builder, "Integer");
    let real = bind_scalar(ctx, &mut builder, "Real");
    let boolean = bind_scalar(ctx, &mut builder, "Boolean");
    let string = bind_string(ctx, &mut builder, integer);
    let exception = bind_exception(ctx, &mut builder, string);

    ctx.set_core_types(CoreTypes {
        integer,
        real,
        boolean,
        string,
        exception,
    });

    bind_array_template(ctx, &mut builder);
    bind_console(ctx, &mut builder);

    builder
        .create_library(ctx)
        .expect("the core library binds no duplicate or cyclic types")
}

fn bind_scalar(ctx: &mut Context, builder: &mut LibraryBuilder, name: &str) -> TypeId {
    let mut ty = BoundType::new(name, CopyMode::ValueType, 1);
    ty.sealed = true;
    ty.creatable_in_script = false;
    ty.location = CodeLocation::native();
    builder
        .add_bound_type(ctx, ty)
        .expect("core scalar names are unique")
}

fn bind_string(ctx: &mut Context, builder: &mut LibraryBuilder, integer: TypeId) -> TypeId {
    let mut ty = BoundType::new("String", CopyMode::ReferenceType, 0);
    ty.sealed = true;
    ty.creatable_in_script = false;
    ty.manager = ManagerKind::String;
    ty.location = CodeLocation::native();
    let string = builder
        .add_bound_type(ctx, ty)
        .expect("core type names are unique");

    let length = builder.add_native_function(
        ctx,
        string,
        "[Get]Length",
        vec![],
        Type::Bound(integer),
        false,
        Rc::new(|call| {
            let length = call
                .this_handle()
                .and_then(|h| call.state.strings.text(h))
                .map(|text| text.chars().count() as i64);
            match length {
                Some(length) => call.set_return_integer(length),
                None => call.raise("Length read on a null String"),
            }
        }),
    );
    ctx.function_mut(length).owning_property = Some("Length".into());
    builder
        .add_getter_setter(
            ctx,
            string,
            GetterSetter {
                name: "Length".into(),
                ty: Type::Bound(integer),
                is_static: false,
                get: Some(length),
                set: None,
                location: CodeLocation::native(),
            },
        )
        .expect("String has no other member named Length");

    builder.add_native_function(
        ctx,
        string,
        "Concat",
        vec![DelegateParam {
            name: "other".into(),
            ty: Type::Bound(string),
        }],
        Type::Bound(string),
        false,
        Rc::new(|call| {
            let this = call
                .this_handle()
                .and_then(|h| call.state.strings.text(h))
                .map(|text| text.to_string());
            let Some(this) = this else {
                call.raise("Concat called on a null String");
                return;
            };
            let other = call.get_string(0);
            if call.has_failed() {
                return;
            }
            call.set_return_string(&format!("{this}{other}"));
        }),
    );

    string
}

fn bind_exception(ctx: &mut Context, builder: &mut LibraryBuilder, string: TypeId) -> TypeId {
    let mut ty = BoundType::new("Exception", CopyMode::ReferenceType, 0);
    ty.location = CodeLocation::native();
    let exception = builder
        .add_bound_type(ctx, ty)
        .expect("core type names are unique");

    let message_offset = builder
        .add_field(
            ctx,
            exception,
            "Message",
            Type::Bound(string),
            false,
            CodeLocation::native(),
        )
        .expect("Exception has no other member named Message");

    builder.add_constructor(
        ctx,
        exception,
        vec![],
        Some(Rc::new(|_call| {})),
        CodeLocation::native(),
    );
    builder.add_constructor(
        ctx,
        exception,
        vec![DelegateParam {
            name: "message".into(),
            ty: Type::Bound(string),
        }],
        Some(Rc::new(move |call| {
            let message = call.get(0);
            call.state.add_reference(&message);
            let old = match call.this_object_mut() {
                Some(object) => {
                    Some(std::mem::replace(
                        &mut object.fields[message_offset as usize],
                        message,
                    ))
                }
                None => None,
            };
            if let Some(old) = old {
                call.release(old);
            }
        })),
        CodeLocation::native(),
    );

    exception
}

fn bind_console(ctx: &mut Context, builder: &mut LibraryBuilder) {
    let mut ty = BoundType::new("Console", CopyMode::ReferenceType, 0);
    ty.sealed = true;
    ty.creatable_in_script = false;
    ty.location = CodeLocation::native();
    let console = builder
        .add_bound_type(ctx, ty)
        .expect("core type names are unique");

    let write = |newline: bool| -> NativeFn {
        Rc::new(move |call: &mut crate::runtime::Call| {
            let value = call.get(0);
            let mut text = crate::runtime::interpreter::display(call.ctx, call.state, &value);
            if newline {
                text.push('\n');
            }
            call.state.write_output(&text);
        })
    };
    builder.add_native_function(
        ctx,
        console,
        "Write",
        vec![DelegateParam {
            name: "value".into(),
            ty: Type::Any,
        }],
        Type::Void,
        true,
        write(false),
    );
    builder.add_native_function(
        ctx,
        console,
        "WriteLine",
        vec![DelegateParam {
            name: "value".into(),
            ty: Type::Any,
        }],
        Type::Void,
        true,
        write(true),
    );
}

// ----- Array[T] -----

fn bind_array_template(ctx: &mut Context, builder: &mut LibraryBuilder) {
    builder.add_template_instantiator(
        ctx,
        "Array",
        1,
        Rc::new(|ctx, full_name, arguments| instantiate_array(ctx, full_name, &arguments[0])),
    );
}

fn array_elements(object: &mut ObjectData) -> &mut Vec<Value> {
    object
        .native
        .get_or_insert_with(|| Box::new(Vec::<Value>::new()))
        .downcast_mut::<Vec<Value>>()
        .expect("array native storage is always Vec<Value>")
}

/// Template instantiations happen after the core library seals, so array
/// members are registered directly in the context rather than through a
/// builder.
fn instantiate_array(ctx: &mut Context, full_name: &str, element: &Type) -> TypeId {
    let integer = ctx.core_types().integer;
    let mut ty = BoundType::new(full_name, CopyMode::ReferenceType, 0);
    ty.sealed = true;
    ty.location = CodeLocation::native();
    let array = ctx.add_type(ty);

    let constructor = add_method(
        ctx,
        array,
        "Constructor",
        vec![],
        Type::Void,
        Rc::new(|call| {
            if let Some(object) = call.this_object_mut() {
                object.native = Some(Box::new(Vec::<Value>::new()));
            }
        }),
    );
    let bound = ctx.ty_mut(array);
    bound.functions.remove("Constructor");
    bound.constructors.push(constructor);

    add_method(
        ctx,
        array,
        "Add",
        vec![DelegateParam {
            name: "value".into(),
            ty: element.clone(),
        }],
        Type::Void,
        Rc::new(|call| {
            let value = call.get(0);
            let added = match call.this_object_mut() {
                Some(object) => {
                    array_elements(object).push(value.clone());
                    true
                }
                None => false,
            };
            if added {
                call.state.add_reference(&value);
            } else {
                call.raise("Add called on a null Array");
            }
        }),
    );

    add_method(
        ctx,
        array,
        "Get",
        vec![DelegateParam {
            name: "index".into(),
            ty: Type::Bound(integer),
        }],
        element.clone(),
        Rc::new(|call| {
            let index = call.get_integer(0);
            let fetched = call.this_object_mut().map(|object| {
                let elements = array_elements(object);
                let count = elements.len() as i64;
                if index < 0 || index >= count {
                    Err(count)
                } else {
                    Ok(elements[index as usize].clone())
                }
            });
            match fetched {
                Some(Ok(value)) => {
                    // Ownership of one reference transfers to the caller.
                    call.state.add_reference(&value);
                    call.set_return(value);
                }
                Some(Err(count)) => call.raise_index(index, count),
                None => call.raise("Get called on a null Array"),
            }
        }),
    );

    add_method(
        ctx,
        array,
        "Set",
        vec![
            DelegateParam {
                name: "index".into(),
                ty: Type::Bound(integer),
            },
            DelegateParam {
                name: "value".into(),
                ty: element.clone(),
            },
        ],
        Type::Void,
        Rc::new(|call| {
            let index = call.get_integer(0);
            let value = call.get(1);
            let swapped = call.this_object_mut().map(|object| {
                let elements = array_elements(object);
                let count = elements.len() as i64;
                if index < 0 || index >= count {
                    Err(count)
                } else {
                    Ok(std::mem::replace(
                        &mut elements[index as usize],
                        value.clone(),
                    ))
                }
            });
            match swapped {
                Some(Ok(old)) => {
                    call.state.add_reference(&value);
                    call.release(old);
                }
                Some(Err(count)) => call.raise_index(index, count),
                None => call.raise("Set called on a null Array"),
            }
        }),
    );

    add_method(
        ctx,
        array,
        "RemoveAt",
        vec![DelegateParam {
            name: "index".into(),
            ty: Type::Bound(integer),
        }],
        Type::Void,
        Rc::new(|call| {
            let index = call.get_integer(0);
            let removed = call.this_object_mut().map(|object| {
                let elements = array_elements(object);
                let count = elements.len() as i64;
                if index < 0 || index >= count {
                    Err(count)
                } else {
                    Ok(elements.remove(index as usize))
                }
            });
            match removed {
                Some(Ok(old)) => call.release(old),
                Some(Err(count)) => call.raise_index(index, count),
                None => call.raise("RemoveAt called on a null Array"),
            }
        }),
    );

    add_method(
        ctx,
        array,
        "Clear",
        vec![],
        Type::Void,
        Rc::new(|call| {
            let cleared = call
                .this_object_mut()
                .map(|object| std::mem::take(array_elements(object)));
            match cleared {
                Some(values) => {
                    for value in values {
                        call.release(value);
                    }
                }
                None => call.raise("Clear called on a null Array"),
            }
        }),
    );

    let count = add_method(
        ctx,
        array,
        "[Get]Count",
        vec![],
        Type::Bound(integer),
        Rc::new(|call| {
            let count = call
                .this_object_mut()
                .map(|object| array_elements(object).len() as i64);
            match count {
                Some(count) => call.set_return_integer(count),
                None => call.raise("Count read on a null Array"),
            }
        }),
    );
    ctx.function_mut(count).owning_property = Some("Count".into());
    ctx.ty_mut(array).functions.remove("[Get]Count");
    ctx.ty_mut(array).properties.push(GetterSetter {
        name: "Count".into(),
        ty: Type::Bound(integer),
        is_static: false,
        get: Some(count),
        set: None,
        location: CodeLocation::native(),
    });

    array
}

/// Register a native instance method directly in the context, mirroring
/// what the library builder does for sealed libraries.
fn add_method(
    ctx: &mut Context,
    owner: TypeId,
    name: &str,
    params: Vec<DelegateParam>,
    return_type: Type,
    native: NativeFn,
) -> FunctionId {
    let delegate = DelegateType {
        params,
        return_type,
    };
    let delegate_id = ctx.add_delegate(delegate.clone());
    let mut function = Function {
        name: name.to_string(),
        owner: Some(owner),
        delegate: delegate_id,
        flags: FunctionFlags::default(),
        location: CodeLocation::native(),
        code: None,
        required_stack: 0,
        native: Some(native),
        owning_property: None,
        return_offset: None,
        param_offsets: Vec::new(),
        this_offset: None,
    };
    function.assign_stack_offsets(&delegate);
    let id = ctx.add_function(function);
    ctx.ty_mut(owner)
        .functions
        .entry(name.to_string())
        .or_default()
        .push(id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::instantiate_template;

    #[test]
    fn core_types_are_registered() {
        let ctx = Context::new();
        let core = ctx.core_types();
        assert_eq!(ctx.ty(core.integer).name, "Integer");
        assert_eq!(ctx.ty(core.string).manager, ManagerKind::String);
        assert!(ctx.ty(core.exception).find_field("Message").is_some());
        assert!(!ctx.ty(core.integer).creatable_in_script);
    }

    #[test]
    fn array_instantiation_is_memoized() {
        let mut ctx = Context::new();
        let element = Type::Bound(ctx.core_types().integer);
        let a = instantiate_template(&mut ctx, "Array", std::slice::from_ref(&element)).unwrap();
        let b = instantiate_template(&mut ctx, "Array", std::slice::from_ref(&element)).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.ty(a).name, "Array[Integer]");
        assert!(ctx.ty(a).find_functions("Add", false).is_some());
        assert!(ctx.ty(a).find_property("Count", false).is_some());
    }

    #[test]
    fn console_members_are_static() {
        let ctx = Context::new();
        let console = ctx.find_type("Console").unwrap();
        assert!(ctx.ty(console).find_functions("WriteLine", true).is_some());
        assert!(ctx.ty(console).find_functions("WriteLine", false).is_none());
    }
}
