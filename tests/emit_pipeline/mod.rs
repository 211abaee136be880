mod dispatch_case;
