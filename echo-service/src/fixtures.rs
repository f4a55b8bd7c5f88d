//! Hand-built schema descriptors for the `router` component.
//!
//! They mirror what `protoc` would emit for the following sources, so tests never need a
//! compiler on the machine:
//!
//! ```proto
//! // common.proto
//! syntax = "proto3";
//! package router;
//! message EventID { string id = 1; }
//! message Level1 { string info = 1; Level2 next = 2; }
//! message Level2 { Level3 next = 1; }
//! message Level3 { string status = 1; string note = 2; }
//! message Node { string name = 1; repeated Node children = 2; }
//!
//! // echo.proto
//! syntax = "proto3";
//! package router;
//! import "common.proto";
//! message EchoRequest { string text = 1; EventID parent_event_id = 2; }
//! message EchoResponse { string text = 1; }
//! message CheckResponse { Level1 detail = 1; repeated Node nodes = 2; }
//! service Echo {
//!   rpc Ping(EchoRequest) returns (EchoResponse);
//!   rpc Check(EchoRequest) returns (CheckResponse);
//! }
//!
//! // legacy.proto
//! syntax = "proto2";
//! package router.legacy;
//! message Ticket { required string title = 1; optional Inner inner = 2; optional string parent_event_id = 3; }
//! message Inner { required int32 code = 1; }
//! service Desk { rpc Open(Ticket) returns (Ticket); }
//! ```
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};

pub const COMPONENT: &str = "router";
pub const PACKAGE: &str = "router";
pub const COMMON_FILE: &str = "common.proto";
pub const ECHO_FILE: &str = "echo.proto";
pub const LEGACY_FILE: &str = "legacy.proto";
pub const ECHO_SERVICE: &str = "router.Echo";

pub fn common_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(COMMON_FILE.to_string()),
        package: Some(PACKAGE.to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            message("EventID", vec![scalar("id", 1, Type::String)]),
            message(
                "Level1",
                vec![
                    scalar("info", 1, Type::String),
                    nested("next", 2, ".router.Level2"),
                ],
            ),
            message("Level2", vec![nested("next", 1, ".router.Level3")]),
            message(
                "Level3",
                vec![
                    scalar("status", 1, Type::String),
                    scalar("note", 2, Type::String),
                ],
            ),
            message(
                "Node",
                vec![
                    scalar("name", 1, Type::String),
                    repeated(nested("children", 2, ".router.Node")),
                ],
            ),
        ],
        ..Default::default()
    }
}

pub fn echo_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(ECHO_FILE.to_string()),
        package: Some(PACKAGE.to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec![COMMON_FILE.to_string()],
        message_type: vec![
            message(
                "EchoRequest",
                vec![
                    scalar("text", 1, Type::String),
                    nested("parent_event_id", 2, ".router.EventID"),
                ],
            ),
            message("EchoResponse", vec![scalar("text", 1, Type::String)]),
            message(
                "CheckResponse",
                vec![
                    nested("detail", 1, ".router.Level1"),
                    repeated(nested("nodes", 2, ".router.Node")),
                ],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Echo".to_string()),
            method: vec![
                method("Ping", ".router.EchoRequest", ".router.EchoResponse"),
                method("Check", ".router.EchoRequest", ".router.CheckResponse"),
            ],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn legacy_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(LEGACY_FILE.to_string()),
        package: Some("router.legacy".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![
            message(
                "Ticket",
                vec![
                    required(scalar("title", 1, Type::String)),
                    nested("inner", 2, ".router.legacy.Inner"),
                    scalar("parent_event_id", 3, Type::String),
                ],
            ),
            message("Inner", vec![required(scalar("code", 1, Type::Int32))]),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Desk".to_string()),
            method: vec![method(
                "Open",
                ".router.legacy.Ticket",
                ".router.legacy.Ticket",
            )],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Two files importing each other.
pub fn cyclic_files() -> Vec<FileDescriptorProto> {
    let file = |name: &str, other: &str| FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some("cycle".to_string()),
        syntax: Some("proto3".to_string()),
        dependency: vec![other.to_string()],
        ..Default::default()
    };
    vec![file("a.proto", "b.proto"), file("b.proto", "a.proto")]
}

/// Every file of the `router` component, dependencies first.
pub fn router_files() -> Vec<FileDescriptorProto> {
    vec![common_file(), echo_file(), legacy_file()]
}

pub fn descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: router_files(),
    }
}

/// A pool holding every `router` file, as the echo server sees it.
pub fn descriptor_pool() -> Result<DescriptorPool, prost_reflect::DescriptorError> {
    DescriptorPool::from_file_descriptor_set(descriptor_set())
}

fn message(name: &str, field: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field,
        ..Default::default()
    }
}

fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn nested(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar(name, number, Type::Message)
    }
}

fn repeated(field: FieldDescriptorProto) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Repeated as i32),
        ..field
    }
}

fn required(field: FieldDescriptorProto) -> FieldDescriptorProto {
    FieldDescriptorProto {
        label: Some(Label::Required as i32),
        ..field
    }
}

fn method(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        ..Default::default()
    }
}
